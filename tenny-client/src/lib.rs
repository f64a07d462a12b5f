//! tenny-client: HTTP access to the expense backend, response caching,
//! cached queries and the bill upload flow.

pub mod api;
pub mod cache;
pub mod error;
pub mod query;
pub mod session;
pub mod upload;

pub use api::{ApiClient, ApiConfig, UserFilters};
pub use cache::QueryCache;
pub use error::{ApiError, ApiResult};
pub use query::{Query, QueryOptions, QueryState};
pub use session::{AuthStatus, MemoryTokenStore, Session, TokenStore};
pub use upload::{OpenError, Preview, Rejection, UploadFile, UploadFlow, UploadPolicy, UploadState};
