// Per-table route set with longest prefix matching

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::route::Route;

/// The routes of one kernel table, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        RoutingTable::default()
    }

    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the best matching route for an address using longest prefix
    /// matching. Linear scan; tables hold tens of routes at most. Ties on
    /// prefix length go to the first inserted route.
    pub fn lookup(&self, address: IpAddr) -> Option<&Route> {
        let mut best_match: Option<(&Route, u8)> = None;

        for route in &self.routes {
            if !route.destination.contains(address) {
                continue;
            }
            let prefix_len = route.destination.prefix();
            match best_match {
                None => best_match = Some((route, prefix_len)),
                Some((_, current_len)) if prefix_len > current_len => {
                    best_match = Some((route, prefix_len));
                }
                _ => {}
            }
        }

        best_match.map(|(route, _)| route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::IpFamily;

    fn route(line: &str) -> Route {
        Route::parse(line, IpFamily::V4).unwrap()
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut table = RoutingTable::new();
        table.add_route(route("100.86.208.0/22 dev wlan0"));
        table.add_route(route("100.86.208.68/30 dev eth1"));

        let found = table.lookup("100.86.208.70".parse().unwrap()).unwrap();
        assert_eq!(found.output_interface, "eth1");
        assert_eq!(found.destination.prefix(), 30);

        // Outside the /30 but inside the /22
        let found = table.lookup("100.86.209.1".parse().unwrap()).unwrap();
        assert_eq!(found.output_interface, "wlan0");
    }

    #[test]
    fn test_equal_length_tie_keeps_first_inserted() {
        let mut table = RoutingTable::new();
        table.add_route(route("10.0.1.0/24 dev first"));
        table.add_route(route("10.0.1.0/24 dev second"));

        let found = table.lookup("10.0.1.5".parse().unwrap()).unwrap();
        assert_eq!(found.output_interface, "first");
    }

    #[test]
    fn test_default_route_covers_everything() {
        let mut table = RoutingTable::new();
        table.add_route(route("default via 100.86.211.254 dev wlan0"));

        assert!(table.lookup("8.8.8.8".parse().unwrap()).is_some());
        assert!(table.lookup("192.168.0.1".parse().unwrap()).is_some());
    }

    #[test]
    fn test_no_covering_route() {
        let mut table = RoutingTable::new();
        table.add_route(route("192.25.25.0/24 dev eth1"));

        assert!(table.lookup("160.25.25.0".parse().unwrap()).is_none());

        let empty = RoutingTable::new();
        assert!(empty.is_empty());
        assert!(empty.lookup("8.8.8.8".parse().unwrap()).is_none());
    }
}
