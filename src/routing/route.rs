// Route model and parsing for one `ip route show` line

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::{parse_prefix, IpFamily};
use crate::error::{AppError, AppResult};

/// Route type as printed by `ip route`. Lines without a leading type
/// keyword are ordinary unicast routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    Unicast,
    Local,
    Unreachable,
    Broadcast,
    Anycast,
    Multicast,
    Blackhole,
    Prohibit,
    Throw,
}

impl RouteType {
    fn from_keyword(token: &str) -> Option<RouteType> {
        match token {
            "local" => Some(RouteType::Local),
            "unreachable" => Some(RouteType::Unreachable),
            "broadcast" => Some(RouteType::Broadcast),
            "anycast" => Some(RouteType::Anycast),
            "multicast" => Some(RouteType::Multicast),
            "blackhole" => Some(RouteType::Blackhole),
            "prohibit" => Some(RouteType::Prohibit),
            "throw" => Some(RouteType::Throw),
            _ => None,
        }
    }
}

/// One parsed route. Immutable once parsed; `raw` keeps the original line
/// for trace output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route_type: RouteType,
    pub destination: IpNetwork,
    pub next_hop: Option<IpAddr>,
    pub output_interface: String,
    pub table_id: String,
    pub raw: String,
}

impl Route {
    /// Parse one line of `ip route show table all` output.
    ///
    /// Grammar: `[type] <dst> [via <next_hop>] dev <iface> [table <id>] ...`
    /// `dev` is mandatory; a missing `table` means the main table (the
    /// kernel omits the keyword there). Trailing attributes the simulator
    /// does not model (metric, proto, scope, src, pref, ...) are ignored.
    pub fn parse(line: &str, family: IpFamily) -> AppResult<Route> {
        let raw = line.trim();
        let tokens: Vec<&str> = raw.split_whitespace().collect();

        let mut idx = 0;
        let route_type = match tokens.first().and_then(|t| RouteType::from_keyword(t)) {
            Some(t) => {
                idx = 1;
                t
            }
            None => RouteType::Unicast,
        };

        let rest = &tokens[idx..];
        if rest.len() < 3 {
            return Err(AppError::RouteParse(format!(
                "too few tokens in {:?}",
                raw
            )));
        }

        let destination = parse_prefix(rest[0], family).ok_or_else(|| {
            AppError::RouteParse(format!("bad destination {:?} in {:?}", rest[0], raw))
        })?;

        let mut next_hop = None;
        let mut output_interface = None;
        let mut table_id = None;

        let mut i = 1;
        while i < rest.len() {
            match rest[i] {
                "via" => {
                    let value = keyword_value(rest, i, raw)?;
                    let addr: IpAddr = value.parse().map_err(|_| {
                        AppError::RouteParse(format!("bad next hop {:?} in {:?}", value, raw))
                    })?;
                    if IpFamily::of(addr) != family {
                        return Err(AppError::RouteParse(format!(
                            "next hop family mismatch in {:?}",
                            raw
                        )));
                    }
                    next_hop = Some(addr);
                    i += 2;
                }
                "dev" => {
                    output_interface = Some(keyword_value(rest, i, raw)?.to_string());
                    i += 2;
                }
                "table" => {
                    table_id = Some(keyword_value(rest, i, raw)?.to_string());
                    i += 2;
                }
                _ => {
                    i += 1;
                }
            }
        }

        let output_interface = output_interface.ok_or_else(|| {
            AppError::RouteParse(format!("missing dev in {:?}", raw))
        })?;

        Ok(Route {
            route_type,
            destination,
            next_hop,
            output_interface,
            table_id: table_id.unwrap_or_else(|| "main".to_string()),
            raw: raw.to_string(),
        })
    }
}

fn keyword_value<'a>(tokens: &[&'a str], i: usize, raw: &str) -> AppResult<&'a str> {
    tokens.get(i + 1).copied().ok_or_else(|| {
        AppError::RouteParse(format!("{} without a value in {:?}", tokens[i], raw))
    })
}
