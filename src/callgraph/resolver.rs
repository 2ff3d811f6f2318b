use crate::error_handling::types::ResolverError;
use log::{debug, info};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Static mapping from well-known port numbers to service names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceResolver {
    ports: HashMap<u16, String>,
}

impl ServiceResolver {
    pub fn new(ports: HashMap<u16, String>) -> Self {
        Self { ports }
    }

    /// Loads a ports file where every line reads `service-name:port[,port...]`.
    pub fn from_file(path: &Path) -> Result<Self, ResolverError> {
        let file = std::fs::File::open(path)
            .map_err(|e| ResolverError::ReadFailed(path.to_path_buf(), e))?;
        let resolver = Self::from_reader(file)
            .map_err(|e| ResolverError::ReadFailed(path.to_path_buf(), e))?;
        info!(
            "Loaded {} port mappings from {}",
            resolver.len(),
            path.display()
        );
        Ok(resolver)
    }

    /// Lines without a colon and port tokens that are not numbers are skipped.
    pub fn from_reader<R: Read>(reader: R) -> std::io::Result<Self> {
        let mut ports = HashMap::new();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            let Some((service, port_list)) = line.split_once(':') else {
                if !line.trim().is_empty() {
                    debug!("Skipping ports line without a colon: '{}'", line);
                }
                continue;
            };
            let service = service.trim();
            for token in port_list.split(',') {
                match token.trim().parse::<u16>() {
                    Ok(port) => {
                        ports.insert(port, service.to_string());
                    }
                    Err(_) => debug!("Skipping port '{}' of service '{}'", token, service),
                }
            }
        }
        Ok(Self { ports })
    }

    pub fn resolve(&self, port: u16) -> Option<&str> {
        self.ports.get(&port).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl FromIterator<(u16, String)> for ServiceResolver {
    fn from_iter<I: IntoIterator<Item = (u16, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
