// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed rspec documents.
//!
//! Requests, advertisements and manifests share one XML vocabulary rooted at
//! `<rspec>`. The decoder is tolerant of namespace prefixes and unknown
//! elements; the encoder emits only what is set, so a request echoed back as
//! a manifest does not grow empty attributes.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::geni::RSPEC_NAMESPACE;

pub const TYPE_REQUEST: &str = "request";
pub const TYPE_ADVERTISEMENT: &str = "advertisement";
pub const TYPE_MANIFEST: &str = "manifest";

/// The only login authentication method the manager hands out.
pub const LOGIN_AUTHENTICATION_SSH: &str = "ssh-keys";

#[derive(Debug, Error)]
pub enum RspecError {
    #[error("invalid xml: {0}")]
    Xml(String),
    #[error("element {0:?} outside of a node")]
    OrphanElement(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rspec {
    pub rspec_type: String,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub client_id: String,
    pub component_id: String,
    pub component_manager_id: String,
    pub component_name: String,
    pub sliver_id: String,
    pub exclusive: bool,
    pub hardware_type: Option<String>,
    pub sliver_types: Vec<SliverType>,
    pub available: Option<bool>,
    pub location: Option<Location>,
    pub logins: Vec<Login>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliverType {
    pub name: String,
    pub disk_images: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    pub country: String,
    pub latitude: String,
    pub longitude: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Login {
    pub authentication: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
}

fn xml_err(e: impl ToString) -> RspecError {
    RspecError::Xml(e.to_string())
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, RspecError> {
    for a in e.attributes() {
        let a = a.map_err(xml_err)?;
        if a.key.local_name().as_ref() == key {
            return Ok(Some(a.unescape_value().map_err(xml_err)?.into_owned()));
        }
    }
    Ok(None)
}

fn attr_or_default(e: &BytesStart<'_>, key: &[u8]) -> Result<String, RspecError> {
    Ok(attr(e, key)?.unwrap_or_default())
}

impl Rspec {
    pub fn new(rspec_type: &str) -> Self {
        Rspec {
            rspec_type: rspec_type.to_string(),
            nodes: Vec::new(),
        }
    }

    pub fn from_xml(xml: &str) -> Result<Rspec, RspecError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut rspec = Rspec::default();
        let mut node: Option<Node> = None;
        let mut sliver_type: Option<SliverType> = None;

        loop {
            match reader.read_event().map_err(xml_err)? {
                Event::Start(e) => {
                    Self::open(&e, &mut rspec, &mut node, &mut sliver_type)?;
                }
                Event::Empty(e) => {
                    Self::open(&e, &mut rspec, &mut node, &mut sliver_type)?;
                    Self::close(e.local_name().as_ref(), &mut rspec, &mut node, &mut sliver_type);
                }
                Event::End(e) => {
                    Self::close(e.local_name().as_ref(), &mut rspec, &mut node, &mut sliver_type);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if let Some(n) = node.take() {
            // Unclosed node element; keep what we saw.
            rspec.nodes.push(n);
        }
        Ok(rspec)
    }

    fn open(
        e: &BytesStart<'_>,
        rspec: &mut Rspec,
        node: &mut Option<Node>,
        sliver_type: &mut Option<SliverType>,
    ) -> Result<(), RspecError> {
        match e.local_name().as_ref() {
            b"rspec" => {
                rspec.rspec_type = attr_or_default(e, b"type")?;
            }
            b"node" => {
                *node = Some(Node {
                    client_id: attr_or_default(e, b"client_id")?,
                    component_id: attr_or_default(e, b"component_id")?,
                    component_manager_id: attr_or_default(e, b"component_manager_id")?,
                    component_name: attr_or_default(e, b"component_name")?,
                    sliver_id: attr_or_default(e, b"sliver_id")?,
                    exclusive: attr(e, b"exclusive")?.as_deref() == Some("true"),
                    ..Node::default()
                });
            }
            b"sliver_type" => {
                if node.is_none() {
                    return Err(RspecError::OrphanElement("sliver_type"));
                }
                *sliver_type = Some(SliverType {
                    name: attr_or_default(e, b"name")?,
                    disk_images: Vec::new(),
                });
            }
            b"disk_image" => {
                let st = sliver_type
                    .as_mut()
                    .ok_or(RspecError::OrphanElement("disk_image"))?;
                st.disk_images.push(attr_or_default(e, b"name")?);
            }
            b"hardware_type" => {
                let n = node.as_mut().ok_or(RspecError::OrphanElement("hardware_type"))?;
                n.hardware_type = attr(e, b"name")?;
            }
            b"available" => {
                let n = node.as_mut().ok_or(RspecError::OrphanElement("available"))?;
                n.available = Some(attr(e, b"now")?.as_deref() == Some("true"));
            }
            b"location" => {
                let n = node.as_mut().ok_or(RspecError::OrphanElement("location"))?;
                n.location = Some(Location {
                    country: attr_or_default(e, b"country")?,
                    latitude: attr_or_default(e, b"latitude")?,
                    longitude: attr_or_default(e, b"longitude")?,
                });
            }
            b"login" => {
                let n = node.as_mut().ok_or(RspecError::OrphanElement("login"))?;
                let port = attr(e, b"port")?
                    .unwrap_or_default()
                    .parse::<u16>()
                    .unwrap_or(22);
                n.logins.push(Login {
                    authentication: attr_or_default(e, b"authentication")?,
                    hostname: attr_or_default(e, b"hostname")?,
                    port,
                    username: attr_or_default(e, b"username")?,
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn close(
        name: &[u8],
        rspec: &mut Rspec,
        node: &mut Option<Node>,
        sliver_type: &mut Option<SliverType>,
    ) {
        match name {
            b"node" => {
                if let Some(mut n) = node.take() {
                    if let Some(st) = sliver_type.take() {
                        n.sliver_types.push(st);
                    }
                    rspec.nodes.push(n);
                }
            }
            b"sliver_type" => {
                if let (Some(n), Some(st)) = (node.as_mut(), sliver_type.take()) {
                    n.sliver_types.push(st);
                }
            }
            _ => {}
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
        out.push_str("<rspec");
        push_attr(&mut out, "xmlns", RSPEC_NAMESPACE);
        push_attr(&mut out, "type", &self.rspec_type);
        out.push('>');
        for node in &self.nodes {
            node.write_xml(&mut out);
        }
        out.push_str("</rspec>");
        out
    }
}

impl Node {
    fn write_xml(&self, out: &mut String) {
        out.push_str("<node");
        push_attr_nonempty(out, "client_id", &self.client_id);
        push_attr_nonempty(out, "component_id", &self.component_id);
        push_attr_nonempty(out, "component_manager_id", &self.component_manager_id);
        push_attr_nonempty(out, "component_name", &self.component_name);
        push_attr_nonempty(out, "sliver_id", &self.sliver_id);
        push_attr(out, "exclusive", if self.exclusive { "true" } else { "false" });
        out.push('>');
        if let Some(hw) = &self.hardware_type {
            out.push_str("<hardware_type");
            push_attr(out, "name", hw);
            out.push_str("/>");
        }
        for st in &self.sliver_types {
            out.push_str("<sliver_type");
            push_attr(out, "name", &st.name);
            if st.disk_images.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                for image in &st.disk_images {
                    out.push_str("<disk_image");
                    push_attr(out, "name", image);
                    out.push_str("/>");
                }
                out.push_str("</sliver_type>");
            }
        }
        if let Some(available) = self.available {
            out.push_str("<available");
            push_attr(out, "now", if available { "true" } else { "false" });
            out.push_str("/>");
        }
        if let Some(location) = &self.location {
            out.push_str("<location");
            push_attr(out, "country", &location.country);
            push_attr(out, "latitude", &location.latitude);
            push_attr(out, "longitude", &location.longitude);
            out.push_str("/>");
        }
        if !self.logins.is_empty() {
            out.push_str("<services>");
            for login in &self.logins {
                out.push_str("<login");
                push_attr(out, "authentication", &login.authentication);
                push_attr(out, "hostname", &login.hostname);
                push_attr(out, "port", &login.port.to_string());
                push_attr(out, "username", &login.username);
                out.push_str("/>");
            }
            out.push_str("</services>");
        }
        out.push_str("</node>");
    }
}

fn push_attr(out: &mut String, key: &str, value: &str) {
    out.push(' ');
    out.push_str(key);
    out.push_str("=\"");
    out.push_str(&escape(value));
    out.push('"');
}

fn push_attr_nonempty(out: &mut String, key: &str, value: &str) {
    if !value.is_empty() {
        push_attr(out, key, value);
    }
}
