//! ノード本体 (子ノード) の読み取り
//!
//! 子ノード名は `machine_type` / `machine-type` のどちらでも受け付けます。
//! `finish` 時に読まれなかったフィールドがあればエラーにします。

use crate::error::{FlowError, Result};
use kdl::{KdlNode, KdlValue};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) struct Body<'a> {
    label: String,
    id: String,
    fields: BTreeMap<String, Vec<&'a KdlNode>>,
    consumed: BTreeSet<String>,
}

impl<'a> Body<'a> {
    pub(crate) fn new(label: &str, id: &str, node: &'a KdlNode) -> Self {
        let mut fields: BTreeMap<String, Vec<&'a KdlNode>> = BTreeMap::new();
        if let Some(children) = node.children() {
            for child in children.nodes() {
                let name = child.name().value().replace('_', "-");
                fields.entry(name).or_default().push(child);
            }
        }

        Self {
            label: label.to_string(),
            id: id.to_string(),
            fields,
            consumed: BTreeSet::new(),
        }
    }

    fn take(&mut self, field: &str) -> Vec<&'a KdlNode> {
        self.consumed.insert(field.to_string());
        self.fields.get(field).cloned().unwrap_or_default()
    }

    fn invalid(&self, field: &str, message: impl Into<String>) -> FlowError {
        FlowError::InvalidValue {
            kind: self.label.clone(),
            id: self.id.clone(),
            field: field.to_string(),
            message: message.into(),
        }
    }

    fn first_value(&mut self, field: &str) -> Result<Option<&'a KdlValue>> {
        let nodes = self.take(field);
        if nodes.len() > 1 {
            return Err(self.invalid(field, "複数回指定されています"));
        }
        Ok(nodes
            .first()
            .copied()
            .and_then(|node| node.entries().first())
            .map(|entry| entry.value()))
    }

    pub(crate) fn string(&mut self, field: &str) -> Result<Option<String>> {
        match self.first_value(field)? {
            None => Ok(None),
            Some(value) => value
                .as_string()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| self.invalid(field, "文字列を指定してください")),
        }
    }

    pub(crate) fn require_string(&mut self, field: &str) -> Result<String> {
        self.string(field)?.ok_or_else(|| FlowError::MissingField {
            kind: self.label.clone(),
            id: self.id.clone(),
            field: field.to_string(),
        })
    }

    /// `spot` のように引数なしで書かれた場合は true
    pub(crate) fn flag(&mut self, field: &str) -> Result<bool> {
        let present = self.fields.contains_key(field);
        match self.first_value(field)? {
            None => Ok(present),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| self.invalid(field, "#true または #false を指定してください")),
        }
    }

    pub(crate) fn u32(&mut self, field: &str) -> Result<Option<u32>> {
        match self.first_value(field)? {
            None => Ok(None),
            Some(value) => {
                let n = value
                    .as_integer()
                    .ok_or_else(|| self.invalid(field, "整数を指定してください"))?;
                u32::try_from(n)
                    .map(Some)
                    .map_err(|_| self.invalid(field, format!("範囲外の値です: {}", n)))
            }
        }
    }

    pub(crate) fn require_u32(&mut self, field: &str) -> Result<u32> {
        self.u32(field)?.ok_or_else(|| FlowError::MissingField {
            kind: self.label.clone(),
            id: self.id.clone(),
            field: field.to_string(),
        })
    }

    /// 同名ノードの全引数を連結して返す
    pub(crate) fn strings(&mut self, field: &str) -> Result<Vec<String>> {
        let mut values = Vec::new();
        for node in self.take(field) {
            for entry in node.entries() {
                let value = entry
                    .value()
                    .as_string()
                    .ok_or_else(|| self.invalid(field, "文字列を指定してください"))?;
                values.push(value.to_string());
            }
        }
        Ok(values)
    }

    /// `secondary-range "pods" "10.4.0.0/14"` のような2引数ノードの集合
    pub(crate) fn pairs(&mut self, field: &str) -> Result<BTreeMap<String, String>> {
        let mut pairs = BTreeMap::new();
        for node in self.take(field) {
            let args: Vec<&str> = node
                .entries()
                .iter()
                .filter_map(|e| e.value().as_string())
                .collect();
            match args.as_slice() {
                [key, value] => {
                    pairs.insert(key.to_string(), value.to_string());
                }
                _ => return Err(self.invalid(field, "名前と値の2つを指定してください")),
            }
        }
        Ok(pairs)
    }

    /// `labels { team "platform" }` のようなブロック
    pub(crate) fn map(&mut self, field: &str) -> Result<BTreeMap<String, String>> {
        let mut map = BTreeMap::new();
        for node in self.take(field) {
            if let Some(children) = node.children() {
                for child in children.nodes() {
                    let value = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_string())
                        .ok_or_else(|| self.invalid(field, "文字列を指定してください"))?;
                    map.insert(child.name().value().to_string(), value.to_string());
                }
            }
        }
        Ok(map)
    }

    pub(crate) fn finish(self) -> Result<()> {
        match self
            .fields
            .keys()
            .find(|name| !self.consumed.contains(name.as_str()))
        {
            Some(unknown) => Err(FlowError::UnknownField {
                kind: self.label.clone(),
                id: self.id.clone(),
                field: unknown.clone(),
            }),
            None => Ok(()),
        }
    }
}
