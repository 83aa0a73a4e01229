// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rule-file model and parser.
//!
//! One rule per line, three whitespace-separated fields:
//!
//! ```text
//! ipv4 A.B.C.D/m {ms|ls}
//! ipv4 A.B.C.D
//! ipv6 addr/m    {ms|ls}
//! as   <1..65535>
//! ```
//!
//! Blank lines and `#` comments are ignored, the kind field is
//! case-insensitive. Any malformed line fails the whole load with the
//! offending line number.

use crate::error::Error;
use crate::trie;
use crate::types::{Prefix4, Prefix6};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

pub const AS_MAX: u32 = 65535;

/// Whether a rule matches update prefixes contained in its network or
/// update prefixes covering its network.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mode {
    /// Match update prefixes within the rule's network (`ms`).
    MoreSpecific,
    /// Match update prefixes that contain the rule's network (`ls`).
    LessSpecific,
}

impl Mode {
    fn as_str(&self) -> &str {
        match self {
            Mode::MoreSpecific => "ms",
            Mode::LessSpecific => "ls",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rule4 {
    pub prefix: Prefix4,
    pub mode: Mode,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rule6 {
    pub prefix: Prefix6,
    pub mode: Mode,
}

/// The parsed rule file: prefix rules per family, AS numbers and bare
/// host addresses.
#[derive(Debug, Default, Clone)]
pub struct RuleSet {
    pub v4: Vec<Rule4>,
    pub v6: Vec<Rule6>,
    pub asns: BTreeSet<u32>,
    pub hosts: BTreeSet<Ipv4Addr>,
}

impl RuleSet {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut rules = RuleSet::default();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            rules.parse_line(line, i + 1)?;
        }
        rules.normalize();
        Ok(rules)
    }

    fn parse_line(&mut self, line: &str, lineno: usize) -> Result<(), Error> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields[0].to_ascii_lowercase().as_str() {
            "ipv4" => match fields.len() {
                2 => {
                    if fields[1].contains('/') {
                        return Err(rule_err(
                            lineno,
                            "ipv4 prefix rule requires a mode (ms|ls)",
                        ));
                    }
                    let host: Ipv4Addr = fields[1].parse().map_err(|_| {
                        rule_err(lineno, "invalid ipv4 host address")
                    })?;
                    self.hosts.insert(host);
                    Ok(())
                }
                3 => {
                    let prefix: Prefix4 = fields[1].parse().map_err(|_| {
                        rule_err(lineno, "invalid ipv4 prefix")
                    })?;
                    let mode = parse_mode(fields[2], lineno)?;
                    self.v4.push(Rule4 { prefix, mode });
                    Ok(())
                }
                _ => Err(rule_err(lineno, "expected 'ipv4 prefix [mode]'")),
            },
            "ipv6" => match fields.len() {
                3 => {
                    let prefix: Prefix6 = fields[1].parse().map_err(|_| {
                        rule_err(lineno, "invalid ipv6 prefix")
                    })?;
                    let mode = parse_mode(fields[2], lineno)?;
                    self.v6.push(Rule6 { prefix, mode });
                    Ok(())
                }
                _ => Err(rule_err(lineno, "expected 'ipv6 prefix mode'")),
            },
            "as" => match fields.len() {
                2 => {
                    let asn: u32 = fields[1].parse().map_err(|_| {
                        rule_err(lineno, "invalid as number")
                    })?;
                    if asn == 0 || asn > AS_MAX {
                        return Err(rule_err(lineno, "as number out of range"));
                    }
                    self.asns.insert(asn);
                    Ok(())
                }
                _ => Err(rule_err(lineno, "expected 'as number'")),
            },
            kind => {
                Err(rule_err(lineno, &format!("unknown rule kind {kind:?}")))
            }
        }
    }

    /// Zero host bits on every prefix rule, then drop duplicates. Two
    /// rules are duplicates only when network, mask and mode all agree.
    fn normalize(&mut self) {
        for r in &mut self.v4 {
            r.prefix.unset_host_bits();
        }
        self.v4.sort();
        self.v4.dedup();

        for r in &mut self.v6 {
            r.prefix.unset_host_bits();
        }
        self.v6.sort();
        self.v6.dedup();
    }

    /// Aggregate adjacent prefixes: two rules of the same mode whose
    /// networks are the two halves of a common parent collapse into the
    /// parent, repeatedly, until no pair remains.
    pub fn condense(&mut self) {
        self.v4 = condense_v4(&self.v4);
        self.v6 = condense_v6(&self.v6);
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len() + self.asns.len() + self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn condense_v4(rules: &[Rule4]) -> Vec<Rule4> {
    let mut out = Vec::new();
    for mode in [Mode::MoreSpecific, Mode::LessSpecific] {
        let nets: BTreeSet<(u8, u128)> = rules
            .iter()
            .filter(|r| r.mode == mode)
            .map(|r| (r.prefix.length, trie::v4_bits(r.prefix.value)))
            .collect();
        out.extend(trie::merge_siblings(nets).into_iter().map(
            |(length, bits)| Rule4 {
                prefix: Prefix4 { value: trie::v4_addr(bits), length },
                mode,
            },
        ));
    }
    out.sort();
    out
}

fn condense_v6(rules: &[Rule6]) -> Vec<Rule6> {
    let mut out = Vec::new();
    for mode in [Mode::MoreSpecific, Mode::LessSpecific] {
        let nets: BTreeSet<(u8, u128)> = rules
            .iter()
            .filter(|r| r.mode == mode)
            .map(|r| (r.prefix.length, r.prefix.value.to_bits()))
            .collect();
        out.extend(trie::merge_siblings(nets).into_iter().map(
            |(length, bits)| Rule6 {
                prefix: Prefix6 {
                    value: std::net::Ipv6Addr::from_bits(bits),
                    length,
                },
                mode,
            },
        ));
    }
    out.sort();
    out
}

fn parse_mode(s: &str, lineno: usize) -> Result<Mode, Error> {
    match s.to_ascii_lowercase().as_str() {
        "ms" => Ok(Mode::MoreSpecific),
        "ls" => Ok(Mode::LessSpecific),
        _ => Err(rule_err(lineno, "mode must be one of ms, ls")),
    }
}

fn rule_err(line: usize, reason: &str) -> Error {
    Error::Rule { line, reason: reason.to_string() }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mode_display_matches_rule_file_tokens() {
        assert_eq!(Mode::MoreSpecific.to_string(), "ms");
        assert_eq!(Mode::LessSpecific.to_string(), "ls");
    }

    #[test]
    fn parse_mixed_rules() {
        let rules = RuleSet::parse(
            "# watchlist\n\
             ipv4 205.94.224.0/20 ms\n\
             IPV4 10.0.0.0/8 ls\n\
             ipv4 192.0.2.1\n\
             ipv6 2a02:1378::/32 LS\n\
             as 53175\n\
             \n",
        )
        .unwrap();

        assert_eq!(rules.v4.len(), 2);
        assert_eq!(rules.v6.len(), 1);
        assert_eq!(rules.asns.len(), 1);
        assert_eq!(rules.hosts.len(), 1);
        assert_eq!(rules.len(), 5);
        assert!(rules.asns.contains(&53175));
        assert!(rules.hosts.contains(&"192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn parse_errors_name_the_line() {
        let cases = [
            ("bogus 1.2.3.0/24 ms", 1),
            ("ipv4 1.2.3.0/24", 1),
            ("\n\nipv4 1.2.3.0/24 xx", 3),
            ("as 0", 1),
            ("as 65536", 1),
            ("as ten", 1),
            ("ipv4 1.2.3.0/33 ms", 1),
            ("ipv4 1.2.3.300", 1),
            ("ipv6 2a02:1378::/129 ls", 1),
            ("ipv6 2a02:1378::/32", 1),
            ("ipv4 1.2.3.4 ms", 1),
        ];
        for (text, want) in cases {
            match RuleSet::parse(text) {
                Err(Error::Rule { line, .. }) => assert_eq!(
                    line, want,
                    "wrong line reported for {text:?}"
                ),
                other => panic!("expected parse error for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn duplicate_rules_are_dropped() {
        let rules = RuleSet::parse(
            "ipv4 10.1.0.0/16 ms\n\
             ipv4 10.1.0.0/16 ms\n\
             ipv4 10.1.0.0/16 ls\n",
        )
        .unwrap();
        // same network and mask with a different mode is not a duplicate
        assert_eq!(rules.v4.len(), 2);
    }

    #[test]
    fn rule_networks_are_normalized() {
        let rules = RuleSet::parse("ipv4 10.1.2.3/16 ms\n").unwrap();
        assert_eq!(
            rules.v4[0].prefix,
            "10.1.0.0/16".parse::<Prefix4>().unwrap()
        );
    }

    #[test]
    fn condense_merges_sibling_halves() {
        let mut rules = RuleSet::parse(
            "ipv4 192.168.0.0/25 ms\n\
             ipv4 192.168.0.128/25 ms\n",
        )
        .unwrap();
        rules.condense();
        assert_eq!(rules.v4.len(), 1);
        assert_eq!(
            rules.v4[0].prefix,
            "192.168.0.0/24".parse::<Prefix4>().unwrap()
        );
        assert_eq!(rules.v4[0].mode, Mode::MoreSpecific);
    }

    #[test]
    fn condense_keeps_modes_apart() {
        let mut rules = RuleSet::parse(
            "ipv4 192.168.0.0/25 ms\n\
             ipv4 192.168.0.128/25 ls\n",
        )
        .unwrap();
        rules.condense();
        assert_eq!(rules.v4.len(), 2);
    }

    #[test]
    fn condense_cascades_to_fixpoint() {
        let mut rules = RuleSet::parse(
            "ipv4 10.0.0.0/25 ms\n\
             ipv4 10.0.0.128/25 ms\n\
             ipv4 10.0.1.0/24 ms\n",
        )
        .unwrap();
        rules.condense();
        // /25 + /25 -> /24, then /24 + /24 -> /23
        assert_eq!(rules.v4.len(), 1);
        assert_eq!(
            rules.v4[0].prefix,
            "10.0.0.0/23".parse::<Prefix4>().unwrap()
        );
    }

    #[test]
    fn condense_leaves_covered_prefixes_alone() {
        let mut rules = RuleSet::parse(
            "ipv4 10.0.0.0/8 ms\n\
             ipv4 10.1.0.0/16 ms\n",
        )
        .unwrap();
        rules.condense();
        // containment is not adjacency; both rules stay
        assert_eq!(rules.v4.len(), 2);
    }

    #[test]
    fn condense_v6_prefixes() {
        let mut rules = RuleSet::parse(
            "ipv6 2a02:1378::/33 ls\n\
             ipv6 2a02:1378:8000::/33 ls\n",
        )
        .unwrap();
        rules.condense();
        assert_eq!(rules.v6.len(), 1);
        assert_eq!(
            rules.v6[0].prefix,
            "2a02:1378::/32".parse::<Prefix6>().unwrap()
        );
    }
}
