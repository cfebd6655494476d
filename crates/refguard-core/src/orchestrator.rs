use crate::authors::validate_authors;
use crate::cache::QueryCache;
use crate::db::DatabaseBackend;
use crate::retraction::RetractionResult;
use crate::{Config, DbResult, DbStatus, Status};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of querying a set of databases for a single reference.
#[derive(Debug, Clone)]
pub struct DbSearchResult {
    pub status: Status,
    pub source: Option<String>,
    pub found_authors: Vec<String>,
    pub paper_url: Option<String>,
    pub failed_dbs: Vec<String>,
    pub db_results: Vec<DbResult>,
    pub retraction: Option<RetractionResult>,
}

impl DbSearchResult {
    fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            source: None,
            found_authors: vec![],
            paper_url: None,
            failed_dbs: vec![],
            db_results: vec![],
            retraction: None,
        }
    }
}

/// Query only the local (offline) databases for a single reference, sequentially.
///
/// Local backends (offline DBLP/ACL Anthology SQLite databases) need no rate
/// limiting and answer in well under a millisecond, so the coordinator runs
/// this phase inline before dispatching anything to the remote drainers. On a
/// verified hit, every other configured database — local and remote alike —
/// is reported `Skipped` through `on_db_complete` so progress output and
/// per-DB counters stay consistent with a full sweep.
pub async fn query_local_databases(
    title: &str,
    ref_authors: &[String],
    config: &Config,
    client: &reqwest::Client,
    longer_timeout: bool,
    only_dbs: Option<&[String]>,
    on_db_complete: Option<&(dyn Fn(DbResult) + Send + Sync)>,
) -> DbSearchResult {
    let check_openalex_authors = config.check_openalex_authors;
    let timeout = if longer_timeout {
        Duration::from_secs(config.db_timeout_secs * 2)
    } else {
        Duration::from_secs(config.db_timeout_secs)
    };

    let all_databases = build_database_list(config, only_dbs);
    let all_db_names: HashSet<String> = all_databases.iter().map(|db| db.name().to_string()).collect();

    let local_dbs: Vec<Box<dyn DatabaseBackend>> =
        all_databases.into_iter().filter(|db| db.is_local()).collect();

    if local_dbs.is_empty() {
        return DbSearchResult::not_found();
    }

    let cache: Option<&Arc<QueryCache>> = config.query_cache.as_ref();
    let mut db_results: Vec<DbResult> = Vec::new();
    let mut completed: HashSet<String> = HashSet::new();
    let mut first_mismatch: Option<DbSearchResult> = None;

    let mark_skipped = |skipped_name: &str, db_results: &mut Vec<DbResult>| {
        let skipped = DbResult {
            db_name: skipped_name.to_string(),
            status: DbStatus::Skipped,
            elapsed: None,
            found_authors: vec![],
            paper_url: None,
            error_message: None,
        };
        if let Some(cb) = on_db_complete {
            cb(skipped.clone());
        }
        db_results.push(skipped);
    };

    for db in &local_dbs {
        let name = db.name().to_string();
        completed.insert(name.clone());

        if !db.pre_filter(title) {
            mark_skipped(&name, &mut db_results);
            continue;
        }

        if let Some(qc) = cache
            && let Some(cached) = qc.get(title, &name)
        {
            if cached.found_title.is_some() {
                let verified =
                    ref_authors.is_empty() || validate_authors(ref_authors, &cached.authors);
                let status = if verified {
                    DbStatus::Match
                } else {
                    DbStatus::AuthorMismatch
                };
                let db_result = DbResult {
                    db_name: name.clone(),
                    status,
                    elapsed: Some(Duration::ZERO),
                    found_authors: cached.authors.clone(),
                    paper_url: cached.paper_url.clone(),
                    error_message: None,
                };
                if let Some(cb) = on_db_complete {
                    cb(db_result.clone());
                }
                db_results.push(db_result);

                if verified {
                    for other in &all_db_names {
                        if other != &name {
                            mark_skipped(other, &mut db_results);
                        }
                    }
                    return DbSearchResult {
                        status: Status::Verified,
                        source: Some(name),
                        found_authors: cached.authors.clone(),
                        paper_url: cached.paper_url.clone(),
                        failed_dbs: vec![],
                        db_results,
                        retraction: cached.retraction.clone(),
                    };
                }

                if first_mismatch.is_none() {
                    first_mismatch = Some(DbSearchResult {
                        status: Status::AuthorMismatch,
                        source: Some(name),
                        found_authors: cached.authors,
                        paper_url: cached.paper_url,
                        failed_dbs: vec![],
                        db_results: vec![],
                        retraction: None,
                    });
                }
            } else {
                let db_result = DbResult {
                    db_name: name,
                    status: DbStatus::NoMatch,
                    elapsed: Some(Duration::ZERO),
                    found_authors: vec![],
                    paper_url: None,
                    error_message: None,
                };
                if let Some(cb) = on_db_complete {
                    cb(db_result.clone());
                }
                db_results.push(db_result);
            }
            continue;
        }

        let start = Instant::now();
        let result = db.query(title, client, timeout).await;
        let elapsed = start.elapsed();

        match result {
            Ok(qr) => {
                if let Some(qc) = cache {
                    qc.insert(title, &name, &qr);
                }

                if qr.is_found() {
                    let verified =
                        ref_authors.is_empty() || validate_authors(ref_authors, &qr.authors);
                    let status = if verified {
                        DbStatus::Match
                    } else {
                        DbStatus::AuthorMismatch
                    };
                    let db_result = DbResult {
                        db_name: name.clone(),
                        status,
                        elapsed: Some(elapsed),
                        found_authors: qr.authors.clone(),
                        paper_url: qr.paper_url.clone(),
                        error_message: None,
                    };
                    if let Some(cb) = on_db_complete {
                        cb(db_result.clone());
                    }
                    db_results.push(db_result);

                    if verified {
                        for other in &all_db_names {
                            if other != &name {
                                mark_skipped(other, &mut db_results);
                            }
                        }
                        return DbSearchResult {
                            status: Status::Verified,
                            source: Some(name),
                            found_authors: qr.authors,
                            paper_url: qr.paper_url,
                            failed_dbs: vec![],
                            db_results,
                            retraction: qr.retraction,
                        };
                    }

                    if first_mismatch.is_none() && (name != "OpenAlex" || check_openalex_authors) {
                        first_mismatch = Some(DbSearchResult {
                            status: Status::AuthorMismatch,
                            source: Some(name),
                            found_authors: qr.authors,
                            paper_url: qr.paper_url,
                            failed_dbs: vec![],
                            db_results: vec![],
                            retraction: None,
                        });
                    }
                } else {
                    let db_result = DbResult {
                        db_name: name,
                        status: DbStatus::NoMatch,
                        elapsed: Some(elapsed),
                        found_authors: vec![],
                        paper_url: None,
                        error_message: None,
                    };
                    if let Some(cb) = on_db_complete {
                        cb(db_result.clone());
                    }
                    db_results.push(db_result);
                }
            }
            Err(e) => {
                let db_result = DbResult {
                    db_name: name,
                    status: DbStatus::Error,
                    elapsed: Some(elapsed),
                    found_authors: vec![],
                    paper_url: None,
                    error_message: Some(e.to_string()),
                };
                if let Some(cb) = on_db_complete {
                    cb(db_result.clone());
                }
                db_results.push(db_result);
            }
        }
    }

    if let Some(mut mismatch) = first_mismatch {
        mismatch.db_results = db_results;
        return mismatch;
    }

    DbSearchResult {
        status: Status::NotFound,
        source: None,
        found_authors: vec![],
        paper_url: None,
        failed_dbs: vec![],
        db_results,
        retraction: None,
    }
}

/// Build the list of database backends based on config.
pub fn build_database_list(
    config: &Config,
    only_dbs: Option<&[String]>,
) -> Vec<Box<dyn DatabaseBackend>> {
    use crate::db::*;

    let mut databases: Vec<Box<dyn DatabaseBackend>> = Vec::new();

    let should_include = |name: &str| -> bool {
        if config
            .disabled_dbs
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name))
        {
            return false;
        }
        match only_dbs {
            Some(dbs) => dbs.iter().any(|d| d == name),
            None => true,
        }
    };

    if should_include("CrossRef") {
        databases.push(Box::new(crossref::CrossRef {
            mailto: config.crossref_mailto.clone(),
        }));
    }
    if should_include("arXiv") {
        databases.push(Box::new(arxiv::Arxiv));
    }
    if should_include("DBLP") {
        // Use offline DBLP if available, otherwise online
        if let Some(ref db) = config.dblp_offline_db {
            databases.push(Box::new(dblp::DblpOffline {
                db: std::sync::Arc::clone(db),
            }));
        } else {
            databases.push(Box::new(dblp::DblpOnline));
        }
    }
    if should_include("Semantic Scholar") {
        databases.push(Box::new(semantic_scholar::SemanticScholar {
            api_key: config.s2_api_key.clone(),
        }));
    }
    if should_include("SSRN") {
        databases.push(Box::new(ssrn::Ssrn));
    }
    if should_include("ACL Anthology") {
        // Use offline ACL if available, otherwise online (scraping)
        if let Some(ref db) = config.acl_offline_db {
            databases.push(Box::new(acl::AclOffline {
                db: std::sync::Arc::clone(db),
            }));
        } else {
            databases.push(Box::new(acl::AclAnthology));
        }
    }
    if should_include("NeurIPS") {
        databases.push(Box::new(neurips::NeurIPS));
    }
    if should_include("Europe PMC") {
        databases.push(Box::new(europe_pmc::EuropePmc));
    }
    if should_include("PubMed") {
        databases.push(Box::new(pubmed::PubMed));
    }
    if should_include("OpenAlex") {
        if let Some(ref db) = config.openalex_offline_db {
            databases.insert(
                0,
                Box::new(openalex_offline::OpenAlexOffline {
                    db: std::sync::Arc::clone(db),
                }),
            );
        } else if let Some(ref key) = config.openalex_key {
            databases.insert(
                0,
                Box::new(openalex::OpenAlex {
                    api_key: key.clone(),
                }),
            );
        }
    }

    databases
}
