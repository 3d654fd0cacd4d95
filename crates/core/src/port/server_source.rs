// Server Source Port (Interface)
// reason: async-trait keeps the port object-safe behind Arc<dyn ServerSource>
use crate::domain::Server;
use crate::error::Result;
use async_trait::async_trait;

/// One page request against the server listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerQuery {
    /// Project ID or slug (`filter[project]`)
    pub project: String,
    /// 1-based page number (`page[number]`)
    pub page: u32,
}

impl ServerQuery {
    pub fn new(project: impl Into<String>, page: u32) -> Self {
        Self {
            project: project.into(),
            page,
        }
    }
}

/// Source of server records, one page at a time
///
/// Implementations return an empty Vec once the listing is exhausted.
#[async_trait]
pub trait ServerSource: Send + Sync {
    /// Fetch a single page of servers sorted by ID
    async fn list_servers(&self, query: &ServerQuery) -> Result<Vec<Server>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// Mock ServerSource serving canned pages
    ///
    /// Page N (1-based) returns `pages[N - 1]`; pages past the end are empty.
    pub struct MockServerSource {
        pages: Vec<Vec<Server>>,
        reject_auth: bool,
        endless: bool,
        queries: Mutex<Vec<ServerQuery>>,
    }

    impl MockServerSource {
        pub fn new(pages: Vec<Vec<Server>>) -> Self {
            Self {
                pages,
                reject_auth: false,
                endless: false,
                queries: Mutex::new(Vec::new()),
            }
        }

        /// Every call fails like a rejected API token
        pub fn unauthorized() -> Self {
            Self {
                reject_auth: true,
                ..Self::new(Vec::new())
            }
        }

        /// Every page repeats the first one, so pagination never ends
        pub fn endless(page: Vec<Server>) -> Self {
            Self {
                endless: true,
                ..Self::new(vec![page])
            }
        }

        pub fn queries(&self) -> Vec<ServerQuery> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ServerSource for MockServerSource {
        async fn list_servers(&self, query: &ServerQuery) -> Result<Vec<Server>> {
            self.queries.lock().unwrap().push(query.clone());

            if self.reject_auth {
                return Err(AppError::Authentication(
                    "401 Unauthorized: invalid API token".to_string(),
                ));
            }

            if self.endless {
                return Ok(self.pages.first().cloned().unwrap_or_default());
            }

            let index = query.page.saturating_sub(1) as usize;
            Ok(self.pages.get(index).cloned().unwrap_or_default())
        }
    }
}
