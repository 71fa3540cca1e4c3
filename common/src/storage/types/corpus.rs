use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::document::Document;

stored_object!(Corpus, "corpus", {
    title: String,
    /// Metadata-only documents, assembled on fetch and never persisted here.
    #[serde(default, skip_serializing)]
    documents: Vec<Document>
});

impl Corpus {
    pub fn new(title: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            title,
            documents: Vec::new(),
        }
    }

    /// Loads the corpus together with the metadata of its documents.
    pub async fn fetch_with_documents(id: &str, db: &SurrealDbClient) -> Result<Self, AppError> {
        let mut corpus = db
            .get_item::<Self>(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("corpus {id}")))?;

        corpus.documents = Document::list_for_corpus(id, db).await?;

        Ok(corpus)
    }
}
