use super::types::{Direction, EventRecord};
use crate::error_handling::types::ParseError;
use log::{debug, warn};

const CONTAINER_FIELD: usize = 2;
const DIRECTION_FIELD: usize = 3;
const ENDPOINT_FIELD: usize = 5;
pub const MIN_FIELDS: usize = ENDPOINT_FIELD + 1;

/// Parser for the space-delimited output of the capture command.
///
/// Each line looks like
/// `<timestamp> <pid> <container> <direction> <method> <host:port/path> ...`.
/// A line with fewer than [`MIN_FIELDS`] fields aborts the whole trace; a line
/// whose endpoint carries no usable port is dropped and parsing continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceParser {
    strict: bool,
}

impl TraceParser {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn parse(&self, output: &str) -> Result<Vec<EventRecord>, ParseError> {
        let mut records = Vec::new();

        for (index, line) in output.lines().enumerate() {
            let line_no = index + 1;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() < MIN_FIELDS {
                return Err(ParseError::TooFewFields {
                    line: line_no,
                    found: fields.len(),
                });
            }

            let marker = fields[DIRECTION_FIELD];
            let direction = if self.strict {
                Direction::from_marker_strict(marker).ok_or_else(|| ParseError::UnknownDirection {
                    line: line_no,
                    marker: marker.to_string(),
                })?
            } else {
                Direction::from_marker(marker)
            };

            let endpoint = fields[ENDPOINT_FIELD];
            let Some(port_text) = port_segment(endpoint) else {
                warn!("line {}: couldn't extract port from '{}'", line_no, endpoint);
                continue;
            };
            let port = match port_text.parse::<u16>() {
                Ok(p) => p,
                Err(e) => {
                    debug!(
                        "line {}: failed to convert port number '{}': {}",
                        line_no, port_text, e
                    );
                    continue;
                }
            };

            records.push(EventRecord::new(fields[CONTAINER_FIELD], direction, port));
        }

        Ok(records)
    }
}

/// `10.0.0.5:8774/v2/servers` -> `8774`; `None` when there is no colon.
fn port_segment(endpoint: &str) -> Option<&str> {
    let (_, rest) = endpoint.split_once(':')?;
    Some(rest.split_once('/').map_or(rest, |(port, _)| port))
}
