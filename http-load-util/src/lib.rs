pub mod drain;

use bytes::Bytes;
use http_body_util::Full;
use hyper::Uri;

/// Load used by the target when a request does not carry one, in seconds of synthetic work.
pub const DEFAULT_LOAD: f64 = 0.05;

#[inline]
pub fn empty_body() -> Full<Bytes> {
    Full::new(Bytes::new())
}

#[inline]
pub fn byte_body<B: Into<Bytes>>(bytes: B) -> Full<Bytes> {
    Full::new(bytes.into())
}

/// Query string of the work endpoint, `/?load=<seconds>`.
#[derive(Debug, Copy, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LoadQuery {
    pub load: Option<f64>,
}

impl LoadQuery {
    #[must_use]
    pub fn new(load: f64) -> Self {
        Self { load: Some(load) }
    }

    /// Puts this query on `base`, keeping its scheme, authority and path. `base` must not
    /// carry a query of its own.
    pub fn to_uri(&self, base: &Uri) -> anyhow::Result<Uri> {
        if base.query().is_some() {
            anyhow::bail!("Base url {base} already has a query");
        }
        let path = base.path().trim_end_matches('/');
        let path_and_query = match self.load {
            Some(load) => format!("{path}/?load={load}"),
            None => format!("{path}/"),
        };
        let mut builder = Uri::builder().path_and_query(path_and_query);
        if let Some(scheme) = base.scheme() {
            builder = builder.scheme(scheme.clone());
        }
        if let Some(authority) = base.authority() {
            builder = builder.authority(authority.clone());
        }
        builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build target url from {base}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(raw: &str) -> Uri {
        raw.parse().unwrap()
    }

    #[test]
    fn load_query_uri() {
        assert_eq!(
            "http://127.0.0.1:5000/?load=0.05",
            LoadQuery::new(0.05)
                .to_uri(&uri("http://127.0.0.1:5000/"))
                .unwrap()
                .to_string()
        );
        assert_eq!(
            "http://127.0.0.1:5000/api/?load=0.2",
            LoadQuery::new(0.2)
                .to_uri(&uri("http://127.0.0.1:5000/api"))
                .unwrap()
                .to_string()
        );
        assert_eq!(
            "http://127.0.0.1:5000/",
            LoadQuery { load: None }
                .to_uri(&uri("http://127.0.0.1:5000"))
                .unwrap()
                .to_string()
        );
    }

    #[test]
    fn base_with_query_is_rejected() {
        let res = LoadQuery::new(0.05).to_uri(&uri("http://h:5000/?x=1"));
        assert!(res.is_err());
    }
}
