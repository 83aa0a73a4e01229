// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::Error;
use std::cmp::Ordering;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct Prefix4 {
    pub value: Ipv4Addr,
    pub length: u8,
}

impl PartialOrd for Prefix4 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Prefix4 {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.value != other.value {
            return self.value.cmp(&other.value);
        }
        self.length.cmp(&other.length)
    }
}

impl Prefix4 {
    pub const MAX_LENGTH: u8 = 32;

    /// Create a new `Prefix4` from an IP address and mask length. The
    /// newly created `Prefix4` has its host bits zeroed, e.g.
    /// `Prefix4::new("10.0.0.10", 24)` is `10.0.0.0/24`.
    pub fn new(ip: Ipv4Addr, length: u8) -> Self {
        let mut new = Self { value: ip, length };
        new.unset_host_bits();
        new
    }

    pub fn host_bits_are_unset(&self) -> bool {
        let mask = match self.length {
            0 => 0,
            _ => (!0u32) << (32 - self.length),
        };

        self.value.to_bits() & mask == self.value.to_bits()
    }

    pub fn unset_host_bits(&mut self) {
        let mask = match self.length {
            0 => 0,
            _ => (!0u32) << (32 - self.length),
        };

        self.value = Ipv4Addr::from_bits(self.value.to_bits() & mask)
    }

    /// Check if this prefix is contained within another prefix.
    /// Returns true if this prefix is equal to or more specific than the
    /// other.
    pub fn within(&self, other: &Prefix4) -> bool {
        // A less specific prefix cannot be within a more specific one
        if self.length < other.length {
            return false;
        }

        if other.length == 0 {
            // /0 contains everything
            return true;
        }

        let mask = !0u32 << (32 - other.length);

        self.value.to_bits() & mask == other.value.to_bits() & mask
    }
}

impl fmt::Display for Prefix4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.length)
    }
}

impl FromStr for Prefix4 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, length) = s
            .split_once('/')
            .ok_or_else(|| Error::InvalidPrefix(s.to_string()))?;

        let value: Ipv4Addr = value
            .parse()
            .map_err(|_| Error::InvalidPrefix(s.to_string()))?;
        let length: u8 = length
            .parse()
            .map_err(|_| Error::InvalidPrefix(s.to_string()))?;
        if length > Self::MAX_LENGTH {
            return Err(Error::InvalidPrefix(s.to_string()));
        }

        Ok(Self { value, length })
    }
}

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct Prefix6 {
    pub value: Ipv6Addr,
    pub length: u8,
}

impl PartialOrd for Prefix6 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Prefix6 {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.value != other.value {
            return self.value.cmp(&other.value);
        }
        self.length.cmp(&other.length)
    }
}

impl Prefix6 {
    pub const MAX_LENGTH: u8 = 128;

    /// Create a new `Prefix6` from an IP address and mask length, with
    /// host bits zeroed.
    pub fn new(ip: Ipv6Addr, length: u8) -> Self {
        let mut new = Self { value: ip, length };
        new.unset_host_bits();
        new
    }

    pub fn host_bits_are_unset(&self) -> bool {
        let mask = match self.length {
            0 => 0,
            _ => (!0u128) << (128 - self.length),
        };

        self.value.to_bits() & mask == self.value.to_bits()
    }

    pub fn unset_host_bits(&mut self) {
        let mask = match self.length {
            0 => 0,
            _ => (!0u128) << (128 - self.length),
        };

        self.value = Ipv6Addr::from_bits(self.value.to_bits() & mask)
    }

    /// Check if this prefix is contained within another prefix.
    /// Returns true if this prefix is equal to or more specific than the
    /// other.
    pub fn within(&self, other: &Prefix6) -> bool {
        if self.length < other.length {
            return false;
        }

        if other.length == 0 {
            return true;
        }

        let mask = !0u128 << (128 - other.length);

        self.value.to_bits() & mask == other.value.to_bits() & mask
    }
}

impl fmt::Display for Prefix6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.length)
    }
}

impl FromStr for Prefix6 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, length) = s
            .split_once('/')
            .ok_or_else(|| Error::InvalidPrefix(s.to_string()))?;

        let value: Ipv6Addr = value
            .parse()
            .map_err(|_| Error::InvalidPrefix(s.to_string()))?;
        let length: u8 = length
            .parse()
            .map_err(|_| Error::InvalidPrefix(s.to_string()))?;
        if length > Self::MAX_LENGTH {
            return Err(Error::InvalidPrefix(s.to_string()));
        }

        Ok(Self { value, length })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prefix4_normalization() {
        let p = Prefix4::new("10.0.0.10".parse().unwrap(), 24);
        assert_eq!(p.value, "10.0.0.0".parse::<Ipv4Addr>().unwrap());
        assert!(p.host_bits_are_unset());

        let q: Prefix4 = "10.0.0.10/24".parse().unwrap();
        assert!(!q.host_bits_are_unset());
    }

    #[test]
    fn prefix4_within() {
        let p8: Prefix4 = "10.0.0.0/8".parse().unwrap();
        let p24: Prefix4 = "10.1.2.0/24".parse().unwrap();
        let other: Prefix4 = "11.0.0.0/8".parse().unwrap();
        let any: Prefix4 = "0.0.0.0/0".parse().unwrap();

        assert!(p24.within(&p8));
        assert!(!p8.within(&p24));
        assert!(p8.within(&p8));
        assert!(!p24.within(&other));
        assert!(p24.within(&any));
    }

    #[test]
    fn prefix4_parse_errors() {
        assert!("10.0.0.0/33".parse::<Prefix4>().is_err());
        assert!("10.0.0.256/8".parse::<Prefix4>().is_err());
        assert!("10.0.0.0".parse::<Prefix4>().is_err());
        assert!("10.0.0.0/".parse::<Prefix4>().is_err());
        assert!("2001:db8::/32".parse::<Prefix4>().is_err());
    }

    #[test]
    fn prefix6_normalization() {
        let p = Prefix6::new("2001:db8::1".parse().unwrap(), 64);
        assert_eq!(p.value, "2001:db8::".parse::<Ipv6Addr>().unwrap());
        assert!(p.host_bits_are_unset());
    }

    #[test]
    fn prefix6_within() {
        let p32: Prefix6 = "2a02:1378::/32".parse().unwrap();
        let p48: Prefix6 = "2a02:1378:1::/48".parse().unwrap();
        let other: Prefix6 = "2a02:1379::/32".parse().unwrap();

        assert!(p48.within(&p32));
        assert!(!p32.within(&p48));
        assert!(!p48.within(&other));
    }

    #[test]
    fn prefix6_parse_errors() {
        assert!("2001:db8::/129".parse::<Prefix6>().is_err());
        assert!("2001:db8::".parse::<Prefix6>().is_err());
        assert!("10.0.0.0/8".parse::<Prefix6>().is_err());
    }
}
