//! Tantivy-based search index module.
//!
//! Provides full-text search over apps with field boosting. The index follows
//! the document store through a live query.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::db::{DocQuery, QueryDocs, Repository, Snapshot, SortOrder};
use crate::errors::AppError;
use crate::models::App;

const BOOST_TITLE: f32 = 10.0;
const BOOST_TAGS: f32 = 6.0;
const BOOST_NAME: f32 = 4.0;
const BOOST_PROMPT: f32 = 3.0;

/// Deepest result a page may start at.
pub const MAX_OFFSET: usize = 10_000;

/// Search result with app id and relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub app_id: String,
    pub score: f32,
}

/// One page of hits plus the number of matching apps.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub total: usize,
}

/// Search index schema fields.
struct SearchFields {
    app_id: Field,
    title: Field,
    name: Field,
    prompt: Field,
    tags: Field,
    /// One untokenized value per tag, for exact filtering.
    tag: Field,
}

/// Tantivy search index for apps.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        let app_id = schema_builder.add_text_field("app_id", STRING | STORED);
        let title = schema_builder.add_text_field("title", TEXT | STORED);
        let name = schema_builder.add_text_field("name", TEXT);
        let prompt = schema_builder.add_text_field("prompt", TEXT);
        let tags = schema_builder.add_text_field("tags", TEXT);
        let tag = schema_builder.add_text_field("tag", STRING);
        let schema = schema_builder.build();

        let fields = SearchFields {
            app_id,
            title,
            name,
            prompt,
            tags,
            tag,
        };

        let index = match Index::open_in_dir(index_path) {
            Ok(index) if index.schema().get_field("tag").is_ok() => index,
            // The indexer rebuilds from the store, so an outdated index is dropped
            Ok(_) => {
                tracing::info!("Search index schema changed, recreating {:?}", index_path);
                std::fs::remove_dir_all(index_path)
                    .and_then(|_| std::fs::create_dir_all(index_path))
                    .map_err(|e| AppError::Search(format!("Failed to reset index: {}", e)))?;
                Index::create_in_dir(index_path, schema)
                    .map_err(|e| AppError::Search(format!("Failed to create index: {}", e)))?
            }
            Err(_) => Index::create_in_dir(index_path, schema)
                .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?,
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from apps.
    pub async fn rebuild(&self, apps: &[App]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for app in apps {
            writer.add_document(self.create_document(app))?;
        }
        writer.commit()?;

        self.reader.reload()?;

        tracing::debug!("Search index rebuilt with {} apps", apps.len());
        Ok(())
    }

    /// Index a single app, replacing any earlier entry.
    pub async fn index_app(&self, app: &App) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.app_id, &app.id);
        writer.delete_term(term);
        writer.add_document(self.create_document(app))?;
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Remove an app from the index.
    pub async fn remove_app(&self, app_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.app_id, app_id);
        writer.delete_term(term);
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Search for apps matching the query, optionally only those carrying `tag`.
    ///
    /// `total` counts every match, not just the returned page. Offsets past
    /// `MAX_OFFSET` are clamped.
    pub fn search(
        &self,
        query_str: &str,
        tag: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<SearchPage, AppError> {
        if query_str.trim().is_empty() {
            return Ok(SearchPage::default());
        }

        let offset = offset.min(MAX_OFFSET);
        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![
                self.fields.title,
                self.fields.name,
                self.fields.prompt,
                self.fields.tags,
            ],
        );
        let base_query = query_parser
            .parse_query(query_str)
            .map_err(|e| AppError::Search(format!("Invalid search query: {}", e)))?;

        let mut subqueries: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();
        let field_queries = [
            (self.fields.title, BOOST_TITLE),
            (self.fields.tags, BOOST_TAGS),
            (self.fields.name, BOOST_NAME),
            (self.fields.prompt, BOOST_PROMPT),
        ];
        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                subqueries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
            }
        }

        let text_query = if subqueries.is_empty() {
            base_query
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        let combined_query: Box<dyn Query> = match tag {
            Some(tag) => Box::new(BooleanQuery::new(vec![
                (Occur::Must, text_query),
                (
                    Occur::Must,
                    Box::new(TermQuery::new(
                        Term::from_field_text(self.fields.tag, tag),
                        IndexRecordOption::Basic,
                    )),
                ),
            ])),
            None => text_query,
        };

        // TopDocs rejects a zero limit
        if limit == 0 {
            let total = searcher
                .search(&combined_query, &Count)
                .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;
            return Ok(SearchPage {
                results: Vec::new(),
                total,
            });
        }

        let (top_docs, total) = searcher
            .search(
                &combined_query,
                &(TopDocs::with_limit(limit.saturating_add(offset)), Count),
            )
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let app_id = doc.get_first(self.fields.app_id)?.as_str()?.to_string();
                Some(SearchResult { app_id, score })
            })
            .collect();

        Ok(SearchPage { results, total })
    }

    fn create_document(&self, app: &App) -> TantivyDocument {
        let mut document = doc!(
            self.fields.app_id => app.id.clone(),
            self.fields.title => app.app_title.clone(),
            self.fields.name => app.app_name.replace('-', " "),
            self.fields.prompt => app.prompt.clone(),
            self.fields.tags => app.tags.join(" ")
        );
        for tag in &app.tags {
            document.add_text(self.fields.tag, tag);
        }
        document
    }
}

/// Keep the index in step with the app documents.
///
/// Follows a live query over all apps. The first snapshot rebuilds the index;
/// later ones re-index changed apps and drop deleted ones.
pub fn spawn_indexer(repo: Arc<Repository>, index: Arc<SearchIndex>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut live = repo.subscribe(DocQuery::Apps, SortOrder::Descending);
        let mut indexed: Option<HashMap<String, App>> = None;
        loop {
            let apps = match live.next().await {
                Ok(Snapshot {
                    docs: QueryDocs::Apps(apps),
                    ..
                }) => apps,
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!("Search indexer query failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let result = match &indexed {
                None => index.rebuild(&apps).await,
                Some(previous) => sync_changes(&index, previous, &apps).await,
            };
            match result {
                Ok(()) => {
                    indexed = Some(apps.into_iter().map(|a| (a.id.clone(), a)).collect());
                }
                Err(e) => {
                    tracing::error!("Search index update failed: {}", e);
                    indexed = None;
                }
            }
        }
    })
}

async fn sync_changes(
    index: &SearchIndex,
    previous: &HashMap<String, App>,
    apps: &[App],
) -> Result<(), AppError> {
    for app in apps {
        if previous.get(&app.id) != Some(app) {
            index.index_app(app).await?;
        }
    }
    let current: HashSet<&str> = apps.iter().map(|a| a.id.as_str()).collect();
    for id in previous.keys().filter(|id| !current.contains(id.as_str())) {
        index.remove_app(id).await?;
    }
    Ok(())
}
