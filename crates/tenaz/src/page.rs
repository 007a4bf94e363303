//! Page-model base layer.
//!
//! A page model is a per-screen façade: a URL pattern, the intents the
//! screen exposes, and intention-revealing operations built on the
//! resolver/waiter/executor trio. Intents are declared once at
//! construction; registration through [`IntentSet`] is also where the
//! exact-matching policy is enforced across a screen's intents.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::flow::StepContext;
use crate::locator::Intent;
use crate::result::TenazResult;
use crate::wait::{Observation, WaitOptions};

/// Default page-load timeout (30 seconds)
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    AnyOne,
    Param(String),
}

/// URL pattern for page identity checks.
///
/// Patterns are path-shaped: literal segments (`/agents`), single-segment
/// wildcards (`/agents/*`), and named parameters (`/agents/:id`). Scheme,
/// host, query string, and fragment of the candidate URL are ignored;
/// page identity lives in the path.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    pattern: String,
    segments: Vec<Segment>,
}

impl UrlPattern {
    /// Parse a pattern
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" {
                    Segment::AnyOne
                } else if let Some(name) = s.strip_prefix(':') {
                    Segment::Param(name.to_string())
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Self { pattern, segments }
    }

    /// The original pattern text
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn path_of(url: &str) -> &str {
        let after_scheme = url
            .split_once("://")
            .map_or(url, |(_, rest)| rest.find('/').map_or("", |i| &rest[i..]));
        let no_query = after_scheme
            .split_once('?')
            .map_or(after_scheme, |(path, _)| path);
        no_query.split_once('#').map_or(no_query, |(path, _)| path)
    }

    /// Whether a URL's path matches this pattern.
    ///
    /// Wildcards and parameters each consume exactly one segment, so the
    /// segment counts must agree.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        let path: Vec<&str> = Self::path_of(url)
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if path.len() != self.segments.len() {
            return false;
        }
        self.segments.iter().zip(&path).all(|(segment, actual)| {
            match segment {
                Segment::Literal(lit) => lit == actual,
                Segment::AnyOne | Segment::Param(_) => true,
            }
        })
    }

    /// Extract named parameters from a matching URL
    #[must_use]
    pub fn params(&self, url: &str) -> HashMap<String, String> {
        let path: Vec<&str> = Self::path_of(url)
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        self.segments
            .iter()
            .zip(&path)
            .filter_map(|(segment, actual)| match segment {
                Segment::Param(name) => Some((name.clone(), (*actual).to_string())),
                _ => None,
            })
            .collect()
    }
}

/// The intents a screen declares, keyed by semantic name.
///
/// Registration enforces the exact-matching policy: a substring role
/// strategy whose name overlaps another registered intent's role name is
/// upgraded to exact, because substring matching conflates semantically
/// opposite states ("Select agent" vs "Deselect agent").
#[derive(Debug, Clone, Default)]
pub struct IntentSet {
    intents: HashMap<String, Intent>,
}

impl IntentSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an intent, enforcing the exactness policy across the set
    pub fn insert(&mut self, intent: Intent) {
        self.intents.insert(intent.name().to_string(), intent);
        self.enforce_exactness();
    }

    /// Look up an intent by semantic name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Intent> {
        self.intents.get(name)
    }

    /// All registered intent names
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.intents.keys().map(String::as_str).collect()
    }

    /// Number of registered intents
    #[must_use]
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    fn enforce_exactness(&mut self) {
        let all_names: Vec<(String, String)> = self
            .intents
            .iter()
            .flat_map(|(owner, intent)| {
                intent
                    .role_names()
                    .into_iter()
                    .map(|n| (owner.clone(), n.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect();

        for (owner, intent) in &mut self.intents {
            if !intent.has_substring_role() {
                continue;
            }
            let own_names: Vec<String> =
                intent.role_names().iter().map(|n| (*n).to_string()).collect();
            let overlaps = own_names.iter().any(|name| {
                all_names.iter().any(|(other_owner, other_name)| {
                    other_owner != owner
                        && (other_name.contains(name.as_str())
                            || name.contains(other_name.as_str()))
                })
            });
            if overlaps {
                intent.require_exact();
                tracing::warn!(
                    intent = %owner,
                    "substring role matching upgraded to exact: name overlaps another intent"
                );
            }
        }
    }
}

/// A per-screen façade over the automation components.
///
/// Implement this for each screen, declaring its URL pattern and intents
/// at construction; or build an ad-hoc model with [`PageModelBuilder`].
/// `Send + Sync` because parallel test workers each hold their own page
/// models inside `Send` step futures.
pub trait PageModel: Send + Sync {
    /// The page's name for logging/records
    fn page_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// URL pattern that identifies this page
    fn url_pattern(&self) -> &UrlPattern;

    /// The intents this screen declares
    fn intents(&self) -> &IntentSet;

    /// An intent whose presence proves the page finished loading
    fn ready_intent(&self) -> Option<&Intent> {
        None
    }

    /// Timeout for the page-load wait
    fn load_timeout(&self) -> Duration {
        Duration::from_millis(DEFAULT_LOAD_TIMEOUT_MS)
    }
}

/// Builder for an ad-hoc page model
#[derive(Debug, Default)]
pub struct PageModelBuilder {
    name: String,
    pattern: Option<UrlPattern>,
    intents: IntentSet,
    ready: Option<String>,
}

impl PageModelBuilder {
    /// Start a builder for a named page
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the URL pattern
    #[must_use]
    pub fn with_url_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(UrlPattern::new(pattern));
        self
    }

    /// Declare an intent
    #[must_use]
    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intents.insert(intent);
        self
    }

    /// Name the intent that proves the page is loaded
    #[must_use]
    pub fn with_ready_intent(mut self, intent_name: impl Into<String>) -> Self {
        self.ready = Some(intent_name.into());
        self
    }

    /// Finish the page model
    #[must_use]
    pub fn build(self) -> DeclaredPage {
        DeclaredPage {
            name: self.name,
            pattern: self.pattern.unwrap_or_else(|| UrlPattern::new("/")),
            intents: self.intents,
            ready: self.ready,
        }
    }
}

/// A generic page model produced by [`PageModelBuilder`]
#[derive(Debug)]
pub struct DeclaredPage {
    name: String,
    pattern: UrlPattern,
    intents: IntentSet,
    ready: Option<String>,
}

impl PageModel for DeclaredPage {
    fn page_name(&self) -> &str {
        &self.name
    }

    fn url_pattern(&self) -> &UrlPattern {
        &self.pattern
    }

    fn intents(&self) -> &IntentSet {
        &self.intents
    }

    fn ready_intent(&self) -> Option<&Intent> {
        self.ready.as_deref().and_then(|name| self.intents.get(name))
    }
}

/// Navigate to a page and wait until it identifies as loaded: the URL
/// matches its pattern and, when declared, the ready intent resolves.
pub async fn open_page(cx: &StepContext, page: &dyn PageModel, url: &str) -> TenazResult<()> {
    tracing::info!(page = page.page_name(), url, "opening page");
    cx.driver().navigate(url).await?;

    let options = WaitOptions::new().with_timeout(page.load_timeout());
    let pattern = page.url_pattern().clone();
    let driver = Arc::clone(cx.driver());
    cx.waiter()
        .wait_until(
            &format!("url matches '{}'", pattern.pattern()),
            &options,
            move || {
                let driver = Arc::clone(&driver);
                let pattern = pattern.clone();
                async move {
                    let url = driver.current_url().await?;
                    Ok(Observation::from_check(pattern.matches(&url), url))
                }
            },
        )
        .await?;

    if let Some(ready) = page.ready_intent() {
        cx.resolver().resolve(ready).await?;
    }
    Ok(())
}
