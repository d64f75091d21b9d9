// Decision trace: the ordered (rule, route) pairs of one routing decision

use serde::{Deserialize, Serialize};
use std::fmt;

use super::policy::PolicyRule;
use super::route::Route;

/// One consulted rule and whatever its table yielded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub rule: PolicyRule,
    pub route: Option<Route>,
}

/// Ordered trace of one decision. Append-only while the manager walks the
/// rules, immutable afterwards. The last entry, when it carries a route,
/// is the decision's outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    entries: Vec<TraceEntry>,
}

impl DecisionTrace {
    pub fn new() -> Self {
        DecisionTrace::default()
    }

    pub(crate) fn push(&mut self, rule: PolicyRule, route: Option<Route>) {
        self.entries.push(TraceEntry { rule, route });
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// The winning route, if the decision produced one
    pub fn selected_route(&self) -> Option<&Route> {
        self.entries.last().and_then(|entry| entry.route.as_ref())
    }
}

impl fmt::Display for DecisionTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "no policy matched");
        }
        for entry in &self.entries {
            writeln!(f, "{}", entry.rule.raw)?;
            match &entry.route {
                Some(route) => writeln!(f, "    {}", route.raw)?,
                None => writeln!(f, "    no route matched")?,
            }
        }
        match self.selected_route() {
            Some(route) => writeln!(f, "packet routed: matched prefix {}", route.destination),
            None => writeln!(f, "packet not routed: no table yielded a route"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::IpFamily;

    fn rule(line: &str) -> PolicyRule {
        PolicyRule::parse(line, IpFamily::V4).unwrap()
    }

    fn route(line: &str) -> Route {
        Route::parse(line, IpFamily::V4).unwrap()
    }

    #[test]
    fn test_render_empty_trace() {
        let trace = DecisionTrace::new();
        assert_eq!(trace.to_string(), "no policy matched\n");
        assert!(trace.selected_route().is_none());
    }

    #[test]
    fn test_render_successful_decision() {
        let mut trace = DecisionTrace::new();
        trace.push(rule("0: from all lookup local"), None);
        trace.push(
            rule("1020: from 100.86.210.153/22 lookup 1003"),
            Some(route(
                "default via 100.86.211.254 dev wlan0 table 1003 metric 65536",
            )),
        );

        let rendered = trace.to_string();
        assert!(rendered.contains("0: from all lookup local"));
        assert!(rendered.contains("no route matched"));
        assert!(rendered.contains("1020: from 100.86.210.153/22 lookup 1003"));
        assert!(rendered
            .contains("default via 100.86.211.254 dev wlan0 table 1003 metric 65536"));
        assert!(rendered.contains("packet routed: matched prefix 0.0.0.0/0"));
    }

    #[test]
    fn test_render_no_route_decision() {
        let mut trace = DecisionTrace::new();
        trace.push(rule("0: from all lookup local"), None);
        trace.push(rule("32766: from all lookup main"), None);

        let rendered = trace.to_string();
        assert!(rendered.contains("packet not routed"));
        assert!(trace.selected_route().is_none());
    }
}
