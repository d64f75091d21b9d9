// RouteManager - builds per-family policy lists and table maps from
// snapshot text and runs the kernel's rule-walk decision

use std::collections::HashMap;
use tracing::{info, warn};

use super::decision::DecisionTrace;
use super::policy::PolicyRule;
use super::route::Route;
use super::table::RoutingTable;
use super::{IpFamily, Packet};
use crate::error::AppResult;
use crate::snapshot::SnapshotSource;

/// Rules and tables of one address family. The rule list keeps the exact
/// order `ip rule show` printed - that order is the kernel evaluation
/// order and is never sorted.
#[derive(Debug, Clone, Default, PartialEq)]
struct FamilyTables {
    rules: Vec<PolicyRule>,
    tables: HashMap<String, RoutingTable>,
}

impl FamilyTables {
    fn build(family: IpFamily, rules_text: &str, routes_text: &str) -> FamilyTables {
        let mut built = FamilyTables::default();

        for line in rules_text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match PolicyRule::parse(line, family) {
                Ok(rule) => built.rules.push(rule),
                Err(e) => warn!("skipping {} rule line: {}", family.name(), e),
            }
        }

        for line in routes_text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match Route::parse(line, family) {
                Ok(route) => built
                    .tables
                    .entry(route.table_id.clone())
                    .or_default()
                    .add_route(route),
                Err(e) => warn!("skipping {} route line: {}", family.name(), e),
            }
        }

        built
    }

    fn route_count(&self) -> usize {
        self.tables.values().map(RoutingTable::len).sum()
    }
}

/// Owns the parsed snapshot and runs decisions against it. Unbuilt until
/// `build_tables` succeeds; rebuilding replaces all prior state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteManager {
    v4: FamilyTables,
    v6: FamilyTables,
}

impl RouteManager {
    pub fn new() -> Self {
        RouteManager::default()
    }

    /// Pull the four text blobs from the source and parse them into the
    /// per-family state. Unparsable lines are logged and skipped; only a
    /// failing source aborts the build.
    pub fn build_tables(&mut self, source: &dyn SnapshotSource) -> AppResult<()> {
        let v4_rules = source.rules(IpFamily::V4)?;
        let v4_routes = source.routes(IpFamily::V4)?;
        let v6_rules = source.rules(IpFamily::V6)?;
        let v6_routes = source.routes(IpFamily::V6)?;

        self.v4 = FamilyTables::build(IpFamily::V4, &v4_rules, &v4_routes);
        self.v6 = FamilyTables::build(IpFamily::V6, &v6_rules, &v6_routes);

        info!(
            "built {} v4 rules / {} v4 routes in {} tables, {} v6 rules / {} v6 routes in {} tables",
            self.v4.rules.len(),
            self.v4.route_count(),
            self.v4.tables.len(),
            self.v6.rules.len(),
            self.v6.route_count(),
            self.v6.tables.len(),
        );
        Ok(())
    }

    /// Walk the packet's family rules in order. A rule that does not
    /// select the packet is skipped without being recorded. For each
    /// selecting rule the referenced table is consulted (an absent table
    /// id behaves as an empty table); the first rule whose table yields
    /// any route - reject types included - ends the walk. On success the
    /// packet's egress interface is filled in from the winning route.
    pub fn route_packet(&self, packet: &mut Packet) -> DecisionTrace {
        let family_tables = match packet.family {
            IpFamily::V4 => &self.v4,
            IpFamily::V6 => &self.v6,
        };

        let mut trace = DecisionTrace::new();
        for rule in &family_tables.rules {
            if !rule.matches(packet) {
                continue;
            }
            let route = family_tables
                .tables
                .get(&rule.table_id)
                .and_then(|table| table.lookup(packet.destination_ip))
                .cloned();
            let found = route.is_some();
            trace.push(rule.clone(), route);
            if found {
                break;
            }
        }

        if let Some(route) = trace.selected_route() {
            packet.output_interface = route.output_interface.clone();
        }
        trace
    }
}
