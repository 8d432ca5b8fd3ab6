//! Authenticated commit/read operations against the store.
//!
//! Reads are lenient by contract: a non-success status or an undecodable
//! body is logged and treated as "nothing found", never raised. Callers
//! needing to distinguish the two can issue the request through the
//! transport themselves and decode with [`pointsync_grid::parse_envelope`].

use crate::auth::{AuthError, ScramHandshake};
use crate::headers::bearer_header;
use crate::transport::{HttpResponse, HttpTransport, TransportError};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use pointsync_core::{Point, Site};
use pointsync_grid::{parse_envelope, point_from_row, site_from_row, Grid, Row};
use std::time::Duration;

/// Characters percent-encoded in the read filter query value.
const FILTER_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Store connection parameters.
#[derive(Debug, Clone)]
pub struct HaystackClientConfig {
    /// Base URL of the store API (e.g. <http://localhost:8080/api>)
    pub base_url: String,
    /// Project name commits and reads are scoped to
    pub project: String,
    /// Request timeout handed to the transport
    pub timeout: Duration,
}

impl Default for HaystackClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            project: "demo".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Authenticated client: holds the transport, the connection parameters
/// and the bearer token produced by the handshake.
pub struct HaystackClient<T: HttpTransport> {
    pub(crate) transport: T,
    config: HaystackClientConfig,
    token: String,
}

impl<T: HttpTransport> HaystackClient<T> {
    /// Authenticate against the store and return a working client.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the handshake fails; no client exists
    /// without a token.
    pub fn connect(
        transport: T,
        config: HaystackClientConfig,
        username: &str,
        password: &str,
    ) -> Result<Self, AuthError> {
        let token = ScramHandshake::new(&transport, &config.base_url).run(username, password)?;
        tracing::info!(base_url = %config.base_url, project = %config.project, "authenticated");
        Ok(Self {
            transport,
            config,
            token,
        })
    }

    /// Build a client around an already-obtained bearer token.
    #[must_use]
    pub fn with_token(transport: T, config: HaystackClientConfig, token: &str) -> Self {
        Self {
            transport,
            config,
            token: token.to_string(),
        }
    }

    /// The bearer token in use. Opaque, reusable within its validity
    /// window, which this layer does not track.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    fn data_headers(&self) -> Vec<(String, String)> {
        vec![
            ("Authorization".to_string(), bearer_header(&self.token)),
            ("accept".to_string(), "application/json".to_string()),
            ("content-type".to_string(), "text/zinc".to_string()),
        ]
    }

    fn commit_url(&self) -> String {
        format!("{}/{}/commit", self.config.base_url, self.config.project)
    }

    fn eval_url(&self) -> String {
        format!("{}/{}/eval", self.config.base_url, self.config.project)
    }

    fn read_url(&self, filter: &str) -> String {
        format!(
            "{}/{}/read?filter={}",
            self.config.base_url,
            self.config.project,
            utf8_percent_encode(filter, FILTER_ESCAPE)
        )
    }

    /// Submit a commit grid and decode the response rows leniently.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] only on network failure; a rejected or
    /// undecodable response logs a warning and yields no rows.
    pub fn commit(&self, op: &'static str, grid: &Grid) -> Result<Vec<Row>, TransportError> {
        let body = grid.render();
        tracing::debug!(op, rows = grid.row_count(), "POST commit");
        let response = self
            .transport
            .post(&self.commit_url(), &self.data_headers(), &body)?;
        Ok(self.lenient_rows(op, &response))
    }

    /// Submit an expression grid for evaluation.
    ///
    /// The response body is not decoded; a non-success status is logged
    /// for the caller's observability and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on network failure.
    pub fn eval(&self, op: &'static str, grid: &Grid) -> Result<(), TransportError> {
        let body = grid.render();
        tracing::debug!(op, rows = grid.row_count(), "POST eval");
        let response = self
            .transport
            .post(&self.eval_url(), &self.data_headers(), &body)?;
        if !response.is_success() {
            tracing::warn!(op, status = response.status, "eval rejected");
        }
        Ok(())
    }

    /// Read rows matching a tag filter.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] only on network failure.
    pub fn read(&self, filter: &str) -> Result<Vec<Row>, TransportError> {
        tracing::debug!(filter, "GET read");
        let response = self
            .transport
            .get(&self.read_url(filter), &self.data_headers())?;
        Ok(self.lenient_rows("read", &response))
    }

    /// Read every site in the project.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] only on network failure.
    pub fn read_sites(&self) -> Result<Vec<Site>, TransportError> {
        let rows = self.read("site")?;
        Ok(decode_rows(&rows, "site", site_from_row))
    }

    /// Read every point in the project.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] only on network failure.
    pub fn read_points(&self) -> Result<Vec<Point>, TransportError> {
        let rows = self.read("point")?;
        Ok(decode_rows(&rows, "point", point_from_row))
    }

    /// Read points matching a caller filter.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] only on network failure.
    pub fn read_filtered_points(&self, filter: &str) -> Result<Vec<Point>, TransportError> {
        let rows = self.read(&format!("{filter} and point"))?;
        Ok(decode_rows(&rows, "point", point_from_row))
    }

    fn lenient_rows(&self, op: &str, response: &HttpResponse) -> Vec<Row> {
        if !response.is_success() {
            tracing::warn!(
                op,
                status = response.status,
                "response not successful; treating as empty result"
            );
            return Vec::new();
        }
        match parse_envelope(&response.body) {
            Ok(rows) => rows,
            Err(error) => {
                tracing::warn!(op, error = %error, "response not decodable; treating as empty result");
                Vec::new()
            }
        }
    }
}

/// Decode rows into entities, skipping rows that fail with a warning.
fn decode_rows<E>(
    rows: &[Row],
    entity: &'static str,
    decode: impl Fn(&Row) -> Result<E, pointsync_grid::GridError>,
) -> Vec<E> {
    rows.iter()
        .filter_map(|row| match decode(row) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                tracing::warn!(entity, error = %error, "skipping undecodable row");
                None
            }
        })
        .collect()
}
