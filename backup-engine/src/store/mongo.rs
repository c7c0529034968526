//! MongoDB / DocumentDB backed document store.

use super::{DocumentStore, DocumentStream};
use crate::utils::errors::{BackupError, Result};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, Credential};
use mongodb::{Client, Database};
use tracing::{debug, info};

/// Connection parameters for the source database.
#[derive(Debug, Clone)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

pub struct MongoDocumentStore {
    client: Client,
    database: Database,
}

impl MongoDocumentStore {
    /// Connect using `settings`. Explicit credentials override any embedded in the URI.
    pub async fn connect(settings: &MongoSettings) -> Result<Self> {
        let mut options = ClientOptions::parse(&settings.uri).await?;
        options.app_name = Some("docdb-backup".to_string());

        if let Some(user) = &settings.user {
            let mut credential = Credential::default();
            credential.username = Some(user.clone());
            credential.password = settings.password.clone();
            options.credential = Some(credential);
        }

        let client = Client::with_options(options)?;
        let database = client.database(&settings.database);
        info!(database = %settings.database, "Connected to document store");

        Ok(Self { client, database })
    }

    pub async fn ping(&self) -> Result<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    /// Close all pooled connections.
    pub async fn shutdown(&self) {
        self.client.clone().shutdown().await;
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    fn backend_type(&self) -> &'static str {
        "mongodb"
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        Ok(self.database.list_collection_names().await?)
    }

    async fn find(&self, collection: &str, filter: Document) -> Result<DocumentStream> {
        debug!(collection, %filter, "Opening cursor");
        let cursor = self
            .database
            .collection::<Document>(collection)
            .find(filter)
            .await?;
        Ok(cursor.map_err(BackupError::from).boxed())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        self.database
            .collection::<Document>(collection)
            .insert_one(document)
            .await?;
        Ok(())
    }
}
