//! Browser automation surface
//!
//! The monitor only ever talks to a rendered page through [`Page`]. Every
//! call may fail; callers treat failures as "nothing observed" for that step.

pub mod locator;
pub mod webdriver;

pub use locator::{Locator, Query, Step};
pub use webdriver::WebDriverPage;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Automation driver errors
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Navigation timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("WebDriver error {0}: {1}")]
    Protocol(String, String),

    #[error("No element matches {0}")]
    NoMatch(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// A rendered page driven by an automation backend
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for the load to finish, up to `timeout`
    async fn goto(&self, url: &str, timeout: Duration) -> DriverResult<()>;

    async fn reload(&self) -> DriverResult<()>;

    async fn title(&self) -> DriverResult<String>;

    /// Number of elements the locator matches
    async fn count(&self, locator: &Locator) -> DriverResult<usize>;

    /// Rendered text of the first matched element
    async fn inner_text(&self, locator: &Locator) -> DriverResult<String>;

    /// Click the first matched element
    async fn click(&self, locator: &Locator) -> DriverResult<()>;

    /// Press and release Escape on the focused element
    async fn press_escape(&self) -> DriverResult<()>;
}
