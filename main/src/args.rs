use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Relevance-ranked answers and content appends over a document corpus", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create an empty corpus and print its id
    CreateCorpus {
        title: String,
    },

    /// Answer a question from the documents of a corpus
    Ask {
        /// Corpus to search
        #[arg(long)]
        corpus: String,

        /// Omit citation numbers from the answer
        #[arg(long = "no-sources", action = clap::ArgAction::SetFalse)]
        include_sources: bool,

        /// Minimum relevance score, overriding the configured threshold
        #[arg(long)]
        threshold: Option<f32>,

        /// Maximum number of documents considered, overriding the configured limit
        #[arg(long)]
        max_results: Option<usize>,

        query: String,
    },

    /// Merge content into the best matching document, or store it as a new one
    Append {
        /// Corpus receiving the content
        #[arg(long)]
        corpus: String,

        /// Merge into this document instead of searching for one
        #[arg(long)]
        target: Option<String>,

        content: String,
    },
}
