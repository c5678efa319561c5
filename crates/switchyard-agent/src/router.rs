use std::collections::HashMap;

/// Total map from classification values to branch ids.
///
/// Anything it does not recognize, including no classification at all,
/// goes to the default branch.
#[derive(Debug, Clone)]
pub struct Router {
    routes: HashMap<String, String>,
    default: String,
}

impl Router {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            routes: HashMap::new(),
            default: default.into(),
        }
    }

    pub fn route_to(mut self, classification: impl Into<String>, branch: impl Into<String>) -> Self {
        self.routes.insert(classification.into(), branch.into());
        self
    }

    pub fn route(&self, classification: Option<&str>) -> &str {
        classification
            .and_then(|c| self.routes.get(c))
            .map(String::as_str)
            .unwrap_or(&self.default)
    }

    pub fn default_branch(&self) -> &str {
        &self.default
    }

    /// Recognized classification values, sorted.
    pub fn classifications(&self) -> Vec<&str> {
        let mut values: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        values.sort_unstable();
        values
    }

    /// Every branch id the router can return, default included.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.default.as_str()).chain(self.routes.values().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support_router() -> Router {
        Router::new("faq")
            .route_to("return_item", "return")
            .route_to("cancel_subscription", "retention")
            .route_to("get_information", "faq")
    }

    #[test]
    fn test_known_values_route() {
        let router = support_router();
        assert_eq!(router.route(Some("return_item")), "return");
        assert_eq!(router.route(Some("cancel_subscription")), "retention");
    }

    #[test]
    fn test_unknown_and_missing_go_to_default() {
        let router = support_router();
        for value in [Some("returnItem"), Some(""), Some("RETURN_ITEM"), None] {
            assert_eq!(router.route(value), "faq");
        }
    }

    #[test]
    fn test_targets_include_default() {
        let router = Router::new("fallback").route_to("a", "branch_a");
        let targets: Vec<&str> = router.targets().collect();
        assert!(targets.contains(&"fallback"));
        assert!(targets.contains(&"branch_a"));
        assert_eq!(router.classifications(), vec!["a"]);
    }
}
