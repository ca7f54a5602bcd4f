// ABOUTME: Composable container predicates used to decide which containers a session touches.
// ABOUTME: Names, exclusions, enable label, scope, image prefix and the watchtower marker.

use std::fmt;
use std::sync::Arc;

/// Minimal view of a container that filters inspect.
pub trait FilterableContainer {
    /// Name with the leading `/`.
    fn name(&self) -> &str;
    fn is_watchtower(&self) -> bool;
    /// Enable label value, `None` when absent or unparseable.
    fn enabled(&self) -> Option<bool>;
    fn scope(&self) -> Option<&str>;
    fn image_name(&self) -> String;
}

type Predicate = dyn Fn(&dyn FilterableContainer) -> bool + Send + Sync;

/// A predicate over containers. Each constructor wraps a base filter, which
/// is only consulted once the wrapper accepts.
#[derive(Clone)]
pub struct Filter(Arc<Predicate>);

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter")
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::no_filter()
    }
}

fn matches_name(candidate: &str, name: &str) -> bool {
    candidate == name || candidate == name.strip_prefix('/').unwrap_or(name)
}

impl Filter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&dyn FilterableContainer) -> bool + Send + Sync + 'static,
    {
        Filter(Arc::new(predicate))
    }

    pub fn accepts(&self, container: &dyn FilterableContainer) -> bool {
        (self.0)(container)
    }

    /// Accepts every container.
    pub fn no_filter() -> Self {
        Filter::new(|_| true)
    }

    /// Accepts only containers carrying the watchtower marker label.
    pub fn watchtower() -> Self {
        Filter::new(|c| c.is_watchtower())
    }

    /// Accepts containers named (with or without the leading `/`) in `names`.
    /// An empty list leaves the filter unchanged.
    pub fn by_names(self, names: Vec<String>) -> Self {
        if names.is_empty() {
            return self;
        }
        Filter::new(move |c| {
            names.iter().any(|n| matches_name(n, c.name())) && self.accepts(c)
        })
    }

    /// Rejects containers named in `names`.
    pub fn by_disabled_names(self, names: Vec<String>) -> Self {
        if names.is_empty() {
            return self;
        }
        Filter::new(move |c| {
            !names.iter().any(|n| matches_name(n, c.name())) && self.accepts(c)
        })
    }

    /// Accepts containers whose image reference starts with one of `images`.
    pub fn by_image(self, images: Vec<String>) -> Self {
        if images.is_empty() {
            return self;
        }
        Filter::new(move |c| {
            let image = c.image_name();
            images.iter().any(|i| image.starts_with(i.as_str())) && self.accepts(c)
        })
    }

    /// Accepts only containers that carry the enable label.
    pub fn by_enable_label(self) -> Self {
        Filter::new(move |c| c.enabled().is_some() && self.accepts(c))
    }

    /// Rejects containers whose enable label is explicitly false.
    pub fn by_disabled_label(self) -> Self {
        Filter::new(move |c| c.enabled() != Some(false) && self.accepts(c))
    }

    /// Scope partitioning. Unscoped containers belong to scope `none`, and an
    /// empty `scope` selects them too.
    pub fn by_scope(self, scope: &str) -> Self {
        let wanted = if scope.is_empty() { "none" } else { scope }.to_string();
        Filter::new(move |c| {
            let own = c.scope().filter(|s| !s.is_empty()).unwrap_or("none");
            own == wanted && self.accepts(c)
        })
    }
}

/// Builds the session filter from operator settings, plus a sentence describing it.
pub fn build_filter(
    names: &[String],
    disabled_names: &[String],
    enable_label: bool,
    scope: &str,
) -> (Filter, String) {
    let mut filter = Filter::no_filter()
        .by_names(names.to_vec())
        .by_disabled_names(disabled_names.to_vec());

    let mut parts: Vec<String> = Vec::new();
    if !names.is_empty() {
        parts.push(format!("which name matches \"{}\"", names.join("\" or \"")));
    }
    if !disabled_names.is_empty() {
        parts.push(format!(
            "not named one of \"{}\"",
            disabled_names.join("\" or \"")
        ));
    }

    if enable_label {
        filter = filter.by_enable_label();
        parts.push("using enable label".to_string());
    }

    if scope == "none" {
        filter = filter.by_scope(scope);
        parts.push("without a scope".to_string());
    } else if !scope.is_empty() {
        filter = filter.by_scope(scope);
        parts.push(format!("in scope \"{}\"", scope));
    }

    filter = filter.by_disabled_label();

    let description = if parts.is_empty() {
        "Checking all containers (except explicitly disabled with label)".to_string()
    } else {
        format!("Only checking containers {}", parts.join(", "))
    };
    (filter, description)
}
