// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The compiled rule set and the match algorithm.

use crate::error::Error;
use crate::extract::UpdateRecord;
use crate::rules::{Mode, Rule4, Rule6, RuleSet};
use crate::trie::{self, PrefixTrie};
use crate::types::{Prefix4, Prefix6};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::path::Path;

/// The compiled filter. Immutable once built, so it can be shared with
/// every worker behind an `Arc` and matched against concurrently without
/// locks.
///
/// A record matches when any axis fires: its origin AS is a watched AS,
/// one of its IPv4 prefixes matches an IPv4 rule under that rule's mode,
/// a watched host address falls inside one of its IPv4 prefixes, or one
/// of its IPv6 prefixes matches an IPv6 rule.
pub struct Filter {
    v4_rules: Vec<Rule4>,
    v6_rules: Vec<Rule6>,
    asns: BTreeSet<u32>,
    hosts: BTreeSet<Ipv4Addr>,
    v4_index: PrefixTrie,
}

impl Filter {
    /// Parse and compile the rule file at `path`. Aggregates adjacent
    /// same-mode prefixes before indexing, so the rule counts reported by
    /// the accessors reflect the condensed set.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(Self::compile(RuleSet::load(path)?))
    }

    pub fn compile(mut rules: RuleSet) -> Self {
        rules.condense();
        let mut v4_index = PrefixTrie::default();
        for (i, r) in rules.v4.iter().enumerate() {
            v4_index.insert(trie::v4_bits(r.prefix.value), r.prefix.length, i);
        }
        Self {
            v4_rules: rules.v4,
            v6_rules: rules.v6,
            asns: rules.asns,
            hosts: rules.hosts,
            v4_index,
        }
    }

    pub fn matches(&self, rec: &UpdateRecord) -> bool {
        if let Some(asn) = rec.terminal_as {
            if self.asns.contains(&asn) {
                return true;
            }
        }
        if rec.v4_prefixes.iter().any(|p| self.match_v4(p)) {
            return true;
        }
        if self.match_hosts(&rec.v4_prefixes) {
            return true;
        }
        rec.v6_prefixes.iter().any(|p| self.match_v6(p))
    }

    fn match_v4(&self, prefix: &Prefix4) -> bool {
        self.v4_index
            .candidates(trie::v4_bits(prefix.value), prefix.length)
            .into_iter()
            .any(|i| rule_matches_v4(&self.v4_rules[i], prefix))
    }

    fn match_v6(&self, prefix: &Prefix6) -> bool {
        self.v6_rules.iter().any(|r| rule_matches_v6(r, prefix))
    }

    fn match_hosts(&self, prefixes: &[Prefix4]) -> bool {
        self.hosts.iter().any(|h| {
            let host = Prefix4 { value: *h, length: 32 };
            prefixes.iter().any(|p| host.within(p))
        })
    }

    pub fn v4_count(&self) -> usize {
        self.v4_rules.len()
    }

    pub fn v6_count(&self) -> usize {
        self.v6_rules.len()
    }

    pub fn as_count(&self) -> usize {
        self.asns.len()
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn total_count(&self) -> usize {
        self.v4_count() + self.v6_count() + self.as_count() + self.host_count()
    }
}

fn rule_matches_v4(rule: &Rule4, prefix: &Prefix4) -> bool {
    match rule.mode {
        // The update prefix sits inside the rule's network.
        Mode::MoreSpecific => prefix.within(&rule.prefix),
        // The update prefix covers or equals the rule's network.
        Mode::LessSpecific => rule.prefix.within(prefix),
    }
}

fn rule_matches_v6(rule: &Rule6, prefix: &Prefix6) -> bool {
    match rule.mode {
        Mode::MoreSpecific => prefix.within(&rule.prefix),
        Mode::LessSpecific => rule.prefix.within(prefix),
    }
}
