use async_trait::async_trait;
use tracing::debug;

use crate::error::AppError;

use super::{
    db::SurrealDbClient,
    types::{
        corpus::Corpus,
        document::{Document, DocumentPatch, NewDocument},
    },
};

/// Persistence collaborator the retrieval and append flows depend on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Corpus with metadata-only documents (`content` is always `None`).
    async fn fetch_corpus(&self, corpus_id: &str) -> Result<Corpus, AppError>;

    /// Single document with its content populated.
    async fn fetch_document(&self, document_id: &str) -> Result<Document, AppError>;

    async fn create_document(&self, new: NewDocument) -> Result<Document, AppError>;

    async fn update_document(
        &self,
        document_id: &str,
        patch: DocumentPatch,
    ) -> Result<Document, AppError>;

    async fn create_corpus(&self, title: &str) -> Result<Corpus, AppError>;
}

#[async_trait]
impl DocumentStore for SurrealDbClient {
    async fn fetch_corpus(&self, corpus_id: &str) -> Result<Corpus, AppError> {
        let corpus = Corpus::fetch_with_documents(corpus_id, self).await?;
        debug!(
            corpus_id,
            document_count = corpus.documents.len(),
            "fetched corpus"
        );
        Ok(corpus)
    }

    async fn fetch_document(&self, document_id: &str) -> Result<Document, AppError> {
        self.get_item::<Document>(document_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("document {document_id}")))
    }

    async fn create_document(&self, new: NewDocument) -> Result<Document, AppError> {
        if self.get_item::<Corpus>(&new.corpus_id).await?.is_none() {
            return Err(AppError::NotFound(format!("corpus {}", new.corpus_id)));
        }

        self.store_item(Document::from_new(new))
            .await?
            .ok_or_else(|| AppError::InternalError("document was not stored".into()))
    }

    async fn update_document(
        &self,
        document_id: &str,
        patch: DocumentPatch,
    ) -> Result<Document, AppError> {
        Document::patch(document_id, &patch, self).await
    }

    async fn create_corpus(&self, title: &str) -> Result<Corpus, AppError> {
        self.store_item(Corpus::new(title.to_string()))
            .await?
            .ok_or_else(|| AppError::InternalError("corpus was not stored".into()))
    }
}
