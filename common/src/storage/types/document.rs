use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Document, "document", {
    corpus_id: String,
    title: String,
    keywords: Vec<String>,
    /// Absent when listed as corpus metadata, present once loaded individually.
    #[serde(default)]
    content: Option<String>
});

/// Fields accepted when creating a document.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub corpus_id: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub content: String,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl DocumentPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

#[derive(Serialize)]
struct DocumentChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    updated_at: surrealdb::sql::Datetime,
}

impl Document {
    pub fn new(
        corpus_id: String,
        title: String,
        keywords: Vec<String>,
        content: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            corpus_id,
            title,
            keywords,
            content,
        }
    }

    pub fn from_new(new: NewDocument) -> Self {
        Self::new(new.corpus_id, new.title, new.keywords, Some(new.content))
    }

    /// Length of the loaded content in characters, zero when not loaded.
    pub fn content_len(&self) -> usize {
        self.content
            .as_deref()
            .map_or(0, |content| content.chars().count())
    }

    /// Metadata of every document in a corpus, oldest first, without content.
    pub async fn list_for_corpus(
        corpus_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let documents: Vec<Self> = db
            .client
            .query(
                "SELECT id, created_at, updated_at, corpus_id, title, keywords FROM type::table($table_name) WHERE corpus_id = $corpus_id ORDER BY created_at ASC",
            )
            .bind(("table_name", Self::table_name()))
            .bind(("corpus_id", corpus_id.to_owned()))
            .await?
            .take(0)?;

        Ok(documents)
    }

    pub async fn patch(
        id: &str,
        patch: &DocumentPatch,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let changes = DocumentChanges {
            title: patch.title.clone(),
            keywords: patch.keywords.clone(),
            content: patch.content.clone(),
            updated_at: surrealdb::sql::Datetime::from(Utc::now()),
        };

        let updated: Option<Self> = db
            .client
            .query("UPDATE type::thing($table_name, $id) MERGE $changes RETURN AFTER")
            .bind(("table_name", Self::table_name()))
            .bind(("id", id.to_owned()))
            .bind(("changes", changes))
            .await?
            .take(0)?;

        updated.ok_or_else(|| AppError::NotFound(format!("document {id}")))
    }
}
