//! Builders for services file entries.

#![allow(dead_code)]

use std::path::Path;

use serde_json::{json, Value};

/// `{name: kind}`, the on-disk shape of a declared input.
fn declared(name: &str, kind: &str) -> Value {
    let mut entry = serde_json::Map::new();
    entry.insert(name.to_string(), Value::String(kind.to_string()));
    Value::Object(entry)
}

pub struct DescriptorBuilder {
    path: String,
    identifier: String,
    output: String,
    execute: String,
    executable: String,
    image: Option<String>,
    parameters: Vec<Value>,
    data: Vec<Value>,
    no_cache: bool,
}

impl DescriptorBuilder {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            identifier: "1".to_string(),
            output: "console".to_string(),
            execute: "local".to_string(),
            executable: "/bin/true".to_string(),
            image: None,
            parameters: Vec::new(),
            data: Vec::new(),
            no_cache: false,
        }
    }

    pub fn identifier(mut self, identifier: &str) -> Self {
        self.identifier = identifier.to_string();
        self
    }

    pub fn output(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self
    }

    pub fn execute(mut self, execute: &str) -> Self {
        self.execute = execute.to_string();
        self
    }

    pub fn executable(mut self, path: &Path) -> Self {
        self.executable = path.to_string_lossy().into_owned();
        self
    }

    pub fn image(mut self, image: &str) -> Self {
        self.image = Some(image.to_string());
        self
    }

    pub fn parameter(mut self, name: &str, kind: &str) -> Self {
        self.parameters.push(declared(name, kind));
        self
    }

    pub fn data(mut self, name: &str) -> Self {
        self.data.push(declared(name, "file"));
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    /// Descriptor JSON; parameters come first in the executable's argument order.
    pub fn build(self) -> Value {
        let order: Vec<Value> = self
            .parameters
            .iter()
            .chain(self.data.iter())
            .cloned()
            .collect();
        let name = self.path.trim_matches('/').replace('/', "");

        let mut descriptor = json!({
            "service": name,
            "identifier": self.identifier,
            "path": self.path,
            "executablePath": self.executable,
            "output": self.output,
            "execute": self.execute,
            "executableType": "bash",
            "parameters": self.parameters,
            "data": self.data,
            "paramOrder": order,
            "noCache": self.no_cache,
            "statistics": {"runtime": -1, "executions": 0},
            "exceptions": []
        });
        if let Some(image) = self.image {
            descriptor["image_name"] = Value::String(image);
        }
        descriptor
    }
}
