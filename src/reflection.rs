//! Plugin introspection.
//!
//! Every Logos plugin answers `getPluginMethods` with a descriptor document
//! listing its invokable methods, and optionally its properties and enums.
//! This module parses that document and renders it for the console.

use crate::client::PluginClient;
use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

/// Remote method that reports a plugin's method descriptors.
pub const DESCRIBE_METHOD: &str = "getPluginMethods";

/// A method parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInfo {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
}

/// An invokable method exposed by a plugin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodInfo {
    pub name: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default = "default_return_type")]
    pub return_type: String,
    #[serde(default = "default_invokable")]
    pub is_invokable: bool,
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,
}

fn default_return_type() -> String {
    "void".to_string()
}

fn default_invokable() -> bool {
    true
}

impl MethodInfo {
    /// `name(type1,type2)` built from the parameter list.
    pub fn derived_signature(&self) -> String {
        let types: Vec<&str> = self.parameters.iter().map(|p| p.type_name.as_str()).collect();
        format!("{}({})", self.name, types.join(","))
    }
}

/// A property exposed by a plugin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default = "default_invokable")]
    pub readable: bool,
    #[serde(default)]
    pub writable: bool,
}

/// One key of an enum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumKey {
    pub name: String,
    pub value: i64,
}

/// An enum exposed by a plugin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumInfo {
    pub name: String,
    #[serde(default)]
    pub keys: Vec<EnumKey>,
}

#[derive(Deserialize)]
struct DescriptorDocument {
    #[serde(default)]
    methods: Vec<MethodInfo>,
    #[serde(default)]
    properties: Vec<PropertyInfo>,
    #[serde(default)]
    enums: Vec<EnumInfo>,
}

/// Everything a plugin reports about itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginIntrospection {
    pub plugin: String,
    pub methods: Vec<MethodInfo>,
    pub properties: Vec<PropertyInfo>,
    pub enums: Vec<EnumInfo>,
}

impl PluginIntrospection {
    /// Parse a descriptor document. A bare array is taken as the method list.
    pub fn from_json(plugin: &str, value: Value) -> Result<Self> {
        let doc = match value {
            Value::Array(_) => DescriptorDocument {
                methods: serde_json::from_value(value)?,
                properties: Vec::new(),
                enums: Vec::new(),
            },
            Value::Object(_) => serde_json::from_value(value)?,
            other => {
                return Err(Error::SerializationError(format!(
                    "Unexpected descriptor for {plugin}: {other}"
                )))
            }
        };

        let methods = doc
            .methods
            .into_iter()
            .map(|mut method| {
                if method.signature.is_empty() {
                    method.signature = method.derived_signature();
                }
                method
            })
            .collect();

        Ok(Self {
            plugin: plugin.to_string(),
            methods,
            properties: doc.properties,
            enums: doc.enums,
        })
    }

    /// Methods that can be called remotely.
    pub fn invokable_methods(&self) -> impl Iterator<Item = &MethodInfo> {
        self.methods.iter().filter(|m| m.is_invokable)
    }

    /// Find a method by name.
    pub fn find_method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Human-readable report. Empty sections are omitted.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Plugin: {}", self.plugin);

        if !self.methods.is_empty() {
            let _ = writeln!(out, "  Methods ({}):", self.methods.len());
            for method in &self.methods {
                let marker = if method.is_invokable { "" } else { " [not invokable]" };
                let _ = writeln!(out, "    {} {}{}", method.return_type, method.signature, marker);
                for param in &method.parameters {
                    let _ = writeln!(out, "      - {}: {}", param.name, param.type_name);
                }
            }
        }

        if !self.properties.is_empty() {
            let _ = writeln!(out, "  Properties ({}):", self.properties.len());
            for prop in &self.properties {
                let access = match (prop.readable, prop.writable) {
                    (true, true) => "rw",
                    (true, false) => "r",
                    (false, true) => "w",
                    (false, false) => "-",
                };
                let _ = writeln!(out, "    {} {} [{}]", prop.type_name, prop.name, access);
            }
        }

        if !self.enums.is_empty() {
            let _ = writeln!(out, "  Enums ({}):", self.enums.len());
            for info in &self.enums {
                let keys: Vec<String> = info
                    .keys
                    .iter()
                    .map(|k| format!("{}={}", k.name, k.value))
                    .collect();
                let _ = writeln!(out, "    {} {{ {} }}", info.name, keys.join(", "));
            }
        }

        out
    }
}

/// Ask `plugin` to describe itself.
pub async fn introspect(client: &dyn PluginClient, plugin: &str) -> Result<PluginIntrospection> {
    let value = client
        .invoke_remote_method(plugin, DESCRIBE_METHOD, Value::Array(Vec::new()))
        .await?;
    PluginIntrospection::from_json(plugin, value)
}
