// Hostforge
// Copyright (C) 2024 - hostforge contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// long with this program.  If not, see <http://www.gnu.org/licenses/>.

//! The Options Record: the shared configuration/state map threaded through
//! the whole pipeline. Sources are merged shallowly in precedence order and
//! every pipeline stage reads and writes the same record; a stage should only
//! write keys it owns or documents it injects (the autoip stage injects `ip`).

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

#[derive(Debug, Clone, Default)]
pub struct Options {
    map: IndexMap<String, Value>,
}

impl Options {
    pub fn new() -> Self {
        Self { map: IndexMap::new() }
    }

    /// Build an Options record from a parsed YAML mapping. Non-string keys
    /// are rejected so a typo'd config file fails loudly.
    pub fn from_mapping(mapping: &Mapping) -> Result<Self, String> {
        let mut options = Self::new();
        for (key, value) in mapping.iter() {
            match key.as_str() {
                Some(k) => {
                    options.map.insert(k.to_string(), value.clone());
                }
                None => return Err(format!("non-string key in configuration: {:?}", key)),
            }
        }
        Ok(options)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.map.insert(key.to_string(), value);
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.set(key, Value::String(value.to_string()));
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set(key, Value::Bool(value));
    }

    pub fn set_i64(&mut self, key: &str, value: i64) {
        self.set(key, Value::Number(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// String view of a key. Numbers are rendered as strings so config values
    /// like `gateway_octet: 1` behave the same as `gateway_octet: "1"`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.map.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.map.get(key) {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.map.get(key) {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_map(&self, key: &str) -> Option<&Mapping> {
        match self.map.get(key) {
            Some(Value::Mapping(m)) => Some(m),
            _ => None,
        }
    }

    /// Shallow merge: every key from `other` overwrites this record's value
    /// for the same key. Nested maps are replaced wholesale, not deep-merged.
    pub fn merge(&mut self, other: &Options) {
        for (key, value) in other.map.iter() {
            self.map.insert(key.clone(), value.clone());
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.map.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
