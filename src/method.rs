//! HTTP verb a grain route answers to.
//!
//! Routes declared with an explicit verb use one of the concrete variants.
//! A method-level route with no verb registers [`Verb::Any`], written `*`,
//! which the table consults only after the exact verb misses.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// The verb half of a route key.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum Verb {
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    /// Wildcard `*`: matches any request method.
    Any,
}

impl Verb {
    /// Returns the uppercase wire representation (e.g. `"GET"`), or `"*"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Any     => "*",
        }
    }

    /// Maps a request method onto a concrete verb. Extension methods have no
    /// verb of their own and can only reach `*` routes.
    pub fn from_method(method: &http::Method) -> Option<Self> {
        method.as_str().parse().ok().filter(|v| *v != Self::Any)
    }
}

/// Parses an uppercase verb (e.g. `"GET"`) or `"*"`. Case-sensitive per RFC 9110 §9.1.
impl FromStr for Verb {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "*"       => Ok(Self::Any),
            _         => Err(()),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Verb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
