// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Daemon configuration, assembled once at startup and shared read-only.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use std::{fs, io};

use federa_core::identifier::{Identifier, ResourceType};

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    /// Colon-separated authority chain this manager speaks for,
    /// e.g. `example.org` or `example.org:testbed`.
    pub authority: String,
    /// Public URL advertised by GetVersion.
    pub absolute_url: String,
    /// Disk-image catalog: short name to container image reference.
    pub images: BTreeMap<String, String>,
    /// Key into `images` used when a request names no disk image.
    pub default_image: String,
    pub cpu_limit: String,
    pub memory_limit: String,
    /// PEM contents of the trusted federation root certificates, one buffer
    /// per configured file.
    pub trusted_roots: Vec<Vec<u8>>,
    pub store_timeout: Duration,
    pub gc_interval: Duration,
    pub gc_timeout: Duration,
    pub default_sliver_lifetime: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let mut images = BTreeMap::new();
        images.insert(
            "ubuntu2004".to_string(),
            "docker.io/library/ubuntu:20.04".to_string(),
        );
        Config {
            listen: SocketAddr::from(([127, 0, 0, 1], 8890)),
            authority: "example.org".to_string(),
            absolute_url: "http://localhost:8890/am".to_string(),
            images,
            default_image: "ubuntu2004".to_string(),
            cpu_limit: "2".to_string(),
            memory_limit: "2Gi".to_string(),
            trusted_roots: Vec::new(),
            store_timeout: Duration::from_secs(10),
            gc_interval: Duration::from_secs(30),
            gc_timeout: Duration::from_secs(60),
            default_sliver_lifetime: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    fn authorities(&self) -> Vec<String> {
        self.authority.split(':').map(str::to_string).collect()
    }

    /// An identifier under this manager's authority.
    pub fn urn(&self, resource_type: ResourceType, name: impl Into<String>) -> Identifier {
        Identifier::new(self.authorities(), resource_type, name)
    }

    /// The component-manager URN stamped into advertisements and manifests.
    pub fn component_manager_urn(&self) -> Identifier {
        self.urn(ResourceType::Authority, "am")
    }

    /// Resolves a disk-image short name to a container image reference.
    /// `None` picks the configured default.
    pub fn resolve_image(&self, short_name: Option<&str>) -> Option<&str> {
        let key = short_name.unwrap_or(&self.default_image);
        self.images.get(key).map(String::as_str)
    }
}

/// Parses a repeated `--container-image name=ref` flag value.
pub fn parse_image_flag(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, reference)) if !name.is_empty() && !reference.is_empty() => {
            Ok((name.to_string(), reference.to_string()))
        }
        _ => Err(format!("expected name=reference, got {value:?}")),
    }
}

/// Reads the trusted root files once; each file may hold several PEM blocks.
pub fn read_trusted_roots(paths: &[PathBuf]) -> io::Result<Vec<Vec<u8>>> {
    paths.iter().map(fs::read).collect()
}
