// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pulls the filterable fields out of one XML update message.
//!
//! The monitor wraps each BGP UPDATE in `<BGP_MESSAGE><ASCII_MSG>
//! <UPDATE>…` with announced and withdrawn prefixes under `WITHDRAWN`,
//! `NLRI`, `MP_REACH_NLRI` and `MP_UNREACH_NLRI`, and the AS path under
//! `AS_PATH/AS_SEG/AS`. Plain `WITHDRAWN` and `NLRI` addresses are IPv4;
//! multiprotocol addresses are classified by their textual form. Missing
//! paths and malformed values are not errors, they just leave the record
//! empty on that axis.

use crate::types::{Prefix4, Prefix6};
use quick_xml::events::Event;
use quick_xml::Reader;

/// The filterable fields of one update: announced or withdrawn prefixes
/// per family, sorted and deduplicated, and the origin AS (the rightmost
/// AS of the path's last segment).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateRecord {
    pub v4_prefixes: Vec<Prefix4>,
    pub v6_prefixes: Vec<Prefix6>,
    pub terminal_as: Option<u32>,
}

impl UpdateRecord {
    pub fn is_empty(&self) -> bool {
        self.v4_prefixes.is_empty()
            && self.v6_prefixes.is_empty()
            && self.terminal_as.is_none()
    }
}

pub fn extract(xml: &str) -> UpdateRecord {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut rec = UpdateRecord::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(
                    String::from_utf8_lossy(e.local_name().as_ref())
                        .into_owned(),
                );
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                let Ok(text) = t.unescape() else {
                    continue;
                };
                let text = text.trim();
                if !text.is_empty() {
                    record_text(&mut rec, &stack, text);
                }
            }
            Ok(Event::Eof) => break,
            // A truncated or malformed document yields whatever was
            // extracted up to the parse failure.
            Err(_) => break,
            Ok(_) => {}
        }
    }

    rec.v4_prefixes.sort();
    rec.v4_prefixes.dedup();
    rec.v6_prefixes.sort();
    rec.v6_prefixes.dedup();
    rec
}

fn record_text(rec: &mut UpdateRecord, stack: &[String], text: &str) {
    let last = match stack.last() {
        Some(l) => l.as_str(),
        None => return,
    };
    let in_path = |name: &str| stack.iter().any(|s| s == name);
    if !in_path("UPDATE") {
        return;
    }

    match last {
        "ADDRESS" if in_path("PREFIX") => {
            if in_path("MP_REACH_NLRI") || in_path("MP_UNREACH_NLRI") {
                push_classified(rec, text);
            } else if in_path("WITHDRAWN") || in_path("NLRI") {
                push_v4(rec, text);
            }
        }
        "AS" if in_path("AS_PATH") && in_path("AS_SEG") => {
            // Last one in document order wins: the rightmost AS of the
            // last segment, the route's origin.
            if let Ok(asn) = text.parse::<u32>() {
                rec.terminal_as = Some(asn);
            }
        }
        _ => {}
    }
}

fn push_v4(rec: &mut UpdateRecord, text: &str) {
    if let Ok(mut p) = text.parse::<Prefix4>() {
        p.unset_host_bits();
        rec.v4_prefixes.push(p);
    }
}

fn push_classified(rec: &mut UpdateRecord, text: &str) {
    if text.contains(':') {
        if let Ok(mut p) = text.parse::<Prefix6>() {
            p.unset_host_bits();
            rec.v6_prefixes.push(p);
        }
    } else {
        push_v4(rec, text);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn msg(update: &str) -> String {
        format!(
            "<BGP_MESSAGE version=\"0.4\"><ASCII_MSG><UPDATE>{update}\
             </UPDATE></ASCII_MSG></BGP_MESSAGE>"
        )
    }

    #[test]
    fn extract_withdrawn_and_nlri() {
        let xml = msg(
            "<WITHDRAWN count=\"2\">\
               <PREFIX label=\"WITH\"><ADDRESS>205.94.224.0/20</ADDRESS></PREFIX>\
               <PREFIX label=\"WITH\"><ADDRESS>150.196.29.0/24</ADDRESS></PREFIX>\
             </WITHDRAWN>\
             <NLRI count=\"1\">\
               <PREFIX label=\"NANN\"><ADDRESS>10.0.0.0/8</ADDRESS></PREFIX>\
             </NLRI>",
        );
        let rec = extract(&xml);
        assert_eq!(
            rec.v4_prefixes,
            vec![
                "10.0.0.0/8".parse().unwrap(),
                "150.196.29.0/24".parse().unwrap(),
                "205.94.224.0/20".parse().unwrap(),
            ]
        );
        assert!(rec.v6_prefixes.is_empty());
        assert_eq!(rec.terminal_as, None);
    }

    #[test]
    fn extract_classifies_multiprotocol_prefixes() {
        let xml = msg(
            "<PATH_ATTRIBUTES>\
               <ATTRIBUTE><MP_REACH_NLRI><NLRI count=\"1\">\
                 <PREFIX><ADDRESS>2a02:1378::/32</ADDRESS></PREFIX>\
               </NLRI></MP_REACH_NLRI></ATTRIBUTE>\
               <ATTRIBUTE><MP_UNREACH_NLRI><WITHDRAWN count=\"1\">\
                 <PREFIX><ADDRESS>198.51.100.0/24</ADDRESS></PREFIX>\
               </WITHDRAWN></MP_UNREACH_NLRI></ATTRIBUTE>\
             </PATH_ATTRIBUTES>",
        );
        let rec = extract(&xml);
        assert_eq!(rec.v4_prefixes, vec!["198.51.100.0/24".parse().unwrap()]);
        assert_eq!(rec.v6_prefixes, vec!["2a02:1378::/32".parse().unwrap()]);
    }

    #[test]
    fn extract_terminal_as_is_rightmost_of_last_segment() {
        let xml = msg(
            "<PATH_ATTRIBUTES><ATTRIBUTE><AS_PATH>\
               <AS_SEG type=\"sequence\" length=\"2\">\
                 <AS>3356</AS><AS>174</AS>\
               </AS_SEG>\
               <AS_SEG type=\"sequence\" length=\"2\">\
                 <AS>1299</AS><AS>53175</AS>\
               </AS_SEG>\
             </AS_PATH></ATTRIBUTE></PATH_ATTRIBUTES>",
        );
        let rec = extract(&xml);
        assert_eq!(rec.terminal_as, Some(53175));
    }

    #[test]
    fn extract_sorts_and_deduplicates() {
        let xml = msg(
            "<NLRI>\
               <PREFIX><ADDRESS>10.2.0.0/16</ADDRESS></PREFIX>\
               <PREFIX><ADDRESS>10.1.0.0/16</ADDRESS></PREFIX>\
               <PREFIX><ADDRESS>10.1.0.0/16</ADDRESS></PREFIX>\
             </NLRI>",
        );
        let rec = extract(&xml);
        assert_eq!(
            rec.v4_prefixes,
            vec![
                "10.1.0.0/16".parse().unwrap(),
                "10.2.0.0/16".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn extract_tolerates_junk() {
        assert!(extract("").is_empty());
        assert!(extract("not xml at all").is_empty());
        assert!(extract("<BGP_MESSAGE><UPDATE>").is_empty());

        // keepalives and opens carry none of the update paths
        let xml = "<BGP_MESSAGE><ASCII_MSG><KEEPALIVE/></ASCII_MSG>\
                   </BGP_MESSAGE>";
        assert!(extract(xml).is_empty());

        // a bad address on one axis does not poison the others
        let xml = msg(
            "<NLRI><PREFIX><ADDRESS>512.0.0.0/8</ADDRESS></PREFIX>\
             <PREFIX><ADDRESS>10.0.0.0/8</ADDRESS></PREFIX></NLRI>",
        );
        let rec = extract(&xml);
        assert_eq!(rec.v4_prefixes, vec!["10.0.0.0/8".parse().unwrap()]);
    }

    #[test]
    fn extract_ignores_addresses_outside_updates() {
        let xml = "<BGP_MESSAGE><ASCII_MSG><STATUS>\
                   <PREFIX><ADDRESS>10.0.0.0/8</ADDRESS></PREFIX>\
                   </STATUS></ASCII_MSG></BGP_MESSAGE>";
        assert!(extract(xml).is_empty());
    }
}
