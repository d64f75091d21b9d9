// Policy rule model, parsing and packet matching for `ip rule show` lines

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use super::{parse_prefix, parse_u32, IpFamily, Packet};
use crate::error::{AppError, AppResult};

/// Highest priority `ip rule` will accept on this simulator's input
const PRIORITY_MAX: u32 = 32767;

/// One parsed `ip rule` entry. Immutable once parsed; `raw` keeps the
/// original line for trace output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub priority: u32,
    pub source: IpNetwork,
    pub table_id: String,
    pub input_interface: Option<String>,
    pub output_interface: Option<String>,
    /// fwmark selector, kept verbatim as `value[/mask]`
    pub fwmark: Option<String>,
    pub raw: String,
}

impl PolicyRule {
    /// Parse one line of `ip rule show` output.
    ///
    /// Grammar: `<priority>: from <src> [fwmark <v[/m]>] [iif <iface>]
    /// [oif <iface>] lookup <table>`. `all` as the source means the whole
    /// address space; the table id is kept verbatim (name or number).
    pub fn parse(line: &str, family: IpFamily) -> AppResult<PolicyRule> {
        let raw = line.trim();

        let (priority_text, selector_text) = raw.split_once(':').ok_or_else(|| {
            AppError::RuleParse(format!("missing priority separator in {:?}", raw))
        })?;

        let priority: u32 = priority_text.trim().parse().map_err(|_| {
            AppError::RuleParse(format!("bad priority {:?} in {:?}", priority_text.trim(), raw))
        })?;
        if priority > PRIORITY_MAX {
            return Err(AppError::RuleParse(format!(
                "priority {} out of range in {:?}",
                priority, raw
            )));
        }

        let tokens: Vec<&str> = selector_text.split_whitespace().collect();
        if tokens.first().copied() != Some("from") {
            return Err(AppError::RuleParse(format!("missing from in {:?}", raw)));
        }
        let source_token = *tokens.get(1).ok_or_else(|| {
            AppError::RuleParse(format!("from without a value in {:?}", raw))
        })?;
        let source = if source_token == "all" {
            family.default_prefix()
        } else {
            parse_prefix(source_token, family).ok_or_else(|| {
                AppError::RuleParse(format!("bad source {:?} in {:?}", source_token, raw))
            })?
        };

        let mut fwmark = None;
        let mut input_interface = None;
        let mut output_interface = None;
        let mut table_id = None;

        let mut i = 2;
        while i < tokens.len() {
            match tokens[i] {
                "fwmark" => {
                    fwmark = Some(keyword_value(&tokens, i, raw)?.to_string());
                    i += 2;
                }
                "iif" => {
                    input_interface = Some(keyword_value(&tokens, i, raw)?.to_string());
                    i += 2;
                }
                "oif" => {
                    output_interface = Some(keyword_value(&tokens, i, raw)?.to_string());
                    i += 2;
                }
                "lookup" => {
                    table_id = Some(keyword_value(&tokens, i, raw)?.to_string());
                    i += 2;
                }
                _ => {
                    i += 1;
                }
            }
        }

        let table_id = table_id
            .ok_or_else(|| AppError::RuleParse(format!("missing lookup in {:?}", raw)))?;

        Ok(PolicyRule {
            priority,
            source,
            table_id,
            input_interface,
            output_interface,
            fwmark,
            raw: raw.to_string(),
        })
    }

    pub fn family(&self) -> IpFamily {
        IpFamily::of_network(self.source)
    }

    /// Whether this rule selects the given packet. Pure; consults the
    /// packet's current egress interface, which is still empty unless a
    /// previous decision filled it in.
    pub fn matches(&self, packet: &Packet) -> bool {
        if self.family() != packet.family {
            return false;
        }
        if !self.source.contains(packet.source_ip) {
            return false;
        }
        if let Some(selector) = &self.fwmark {
            if !fwmark_matches(selector, packet.fwmark) {
                return false;
            }
        }
        if let Some(iif) = &self.input_interface {
            if *iif != packet.input_interface {
                return false;
            }
        }
        if let Some(oif) = &self.output_interface {
            if *oif != packet.output_interface {
                return false;
            }
        }
        true
    }
}

fn keyword_value<'a>(tokens: &[&'a str], i: usize, raw: &str) -> AppResult<&'a str> {
    tokens.get(i + 1).copied().ok_or_else(|| {
        AppError::RuleParse(format!("{} without a value in {:?}", tokens[i], raw))
    })
}

/// Masked fwmark comparison against a verbatim `value[/mask]` selector.
/// A selector that does not parse as u32 never matches.
fn fwmark_matches(selector: &str, mark: u32) -> bool {
    let (value_text, mask_text) = match selector.split_once('/') {
        Some((value, mask)) => (value, Some(mask)),
        None => (selector, None),
    };
    let Some(value) = parse_u32(value_text) else {
        return false;
    };
    let mask = match mask_text {
        Some(text) => match parse_u32(text) {
            Some(mask) => mask,
            None => return false,
        },
        None => u32::MAX,
    };
    mark & mask == value & mask
}
