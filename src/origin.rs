use crate::result::CorsError;
use std::fmt;
use url::Url;

const WEB_SCHEMES: [&str; 4] = ["http", "https", "data", "blob"];

/// The (scheme, host, port) identity a request acts on behalf of.
///
/// Opaque origins are unique: they only ever equal their own clones, and
/// serialize as `null`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Origin(url::Origin);

impl Origin {
    pub fn of(url: &Url) -> Self {
        Self(url.origin())
    }

    pub fn parse(input: &str) -> Result<Self, CorsError> {
        Url::parse(input)
            .map(|url| Self::of(&url))
            .map_err(|_| CorsError::BadUri)
    }

    pub fn new_opaque() -> Self {
        Self(url::Origin::new_opaque())
    }

    pub fn is_opaque(&self) -> bool {
        !self.0.is_tuple()
    }

    pub fn same_origin(&self, other: &Origin) -> bool {
        self.0.is_tuple() && self == other
    }

    /// True when `url` belongs to this origin.
    pub fn may_load(&self, url: &Url) -> bool {
        self.same_origin(&Origin::of(url))
    }

    /// Standard load policy: same-origin targets and the web schemes.
    pub fn check_load(&self, url: &Url) -> Result<(), CorsError> {
        if self.may_load(url) || WEB_SCHEMES.contains(&url.scheme()) {
            Ok(())
        } else {
            Err(CorsError::LoadDenied(url.scheme().to_owned()))
        }
    }

    /// `scheme://host[:port]`, or `null` for opaque origins.
    pub fn ascii_serialization(&self) -> String {
        self.0.ascii_serialization()
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_opaque() {
            f.write_str("Origin(opaque)")
        } else {
            write!(f, "Origin({})", self.ascii_serialization())
        }
    }
}

impl From<&Url> for Origin {
    fn from(url: &Url) -> Self {
        Self::of(url)
    }
}

#[cfg(test)]
#[path = "origin_test.rs"]
mod origin_test;
