//! The instance table: every DATA instance of one exchange file, addressable
//! by id and by keyword, with parameters kept as raw text.

use crate::error::StepError;
use crate::params::{parse_params, StepValue};
use crate::refs;
use std::collections::HashMap;

/// `insttype` value reported for complex (multi-record) instances.
pub const COMPLEX_TYPE: &str = "complex_type";

/// One `KEYWORD(params)` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Entity keyword, e.g. `PRODUCT_DEFINITION`.
    pub keyword: String,
    /// Parameter text between the outer parentheses, verbatim.
    pub params: String,
}

impl Record {
    /// Create a record.
    pub fn new(keyword: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            params: params.into(),
        }
    }
}

/// Simple or complex instance body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceKind {
    /// `#id = KEYWORD(params);`
    Simple(Record),
    /// `#id = (A(..) B(..) ...);`
    Complex(Vec<Record>),
}

/// A single `#id = ...;` instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Instance id from `#<digits>`.
    pub id: u64,
    /// Body.
    pub kind: InstanceKind,
}

impl Instance {
    /// Keyword of a simple instance, or [`COMPLEX_TYPE`].
    pub fn type_name(&self) -> &str {
        match &self.kind {
            InstanceKind::Simple(r) => &r.keyword,
            InstanceKind::Complex(_) => COMPLEX_TYPE,
        }
    }

    /// The records making up this instance (one for simple instances).
    pub fn records(&self) -> &[Record] {
        match &self.kind {
            InstanceKind::Simple(r) => std::slice::from_ref(r),
            InstanceKind::Complex(rs) => rs,
        }
    }

    /// Whether this instance is, or contains a record of, `keyword`.
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.records().iter().any(|r| r.keyword == keyword)
    }

    /// Raw parameters of the record named `keyword`.
    pub fn params_of(&self, keyword: &str) -> Option<&str> {
        self.records()
            .iter()
            .find(|r| r.keyword == keyword)
            .map(|r| r.params.as_str())
    }

    /// Every entity reference in the instance, across all records.
    pub fn references(&self) -> Vec<u64> {
        self.records()
            .iter()
            .flat_map(|r| refs::references(&r.params))
            .collect()
    }

    /// Copy of this instance under `new_id` with each reference mapped
    /// through `f`.
    pub fn renumbered(&self, new_id: u64, mut f: impl FnMut(u64) -> u64) -> Instance {
        let kind = match &self.kind {
            InstanceKind::Simple(r) => InstanceKind::Simple(renumber_record(r, &mut f)),
            InstanceKind::Complex(rs) => {
                InstanceKind::Complex(rs.iter().map(|r| renumber_record(r, &mut f)).collect())
            }
        };
        Instance { id: new_id, kind }
    }
}

fn renumber_record(record: &Record, f: &mut dyn FnMut(u64) -> u64) -> Record {
    Record {
        keyword: record.keyword.clone(),
        params: refs::renumber(&record.params, f),
    }
}

/// Parsed DATA content of one exchange file.
#[derive(Debug, Clone, Default)]
pub struct InstanceTable {
    header: String,
    header_records: Vec<Record>,
    instances: HashMap<u64, Instance>,
    order: Vec<u64>,
    typeinst: HashMap<String, Vec<u64>>,
}

impl InstanceTable {
    /// Create an empty table with the given verbatim header body.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            ..Self::default()
        }
    }

    /// Insert an instance. Ids must be unique; the caller reports the
    /// position of a duplicate.
    pub(crate) fn insert(&mut self, instance: Instance) -> Result<(), Instance> {
        if self.instances.contains_key(&instance.id) {
            return Err(instance);
        }
        for record in instance.records() {
            let ids = self.typeinst.entry(record.keyword.clone()).or_default();
            // A complex instance listing the same keyword twice is indexed once.
            if ids.last() != Some(&instance.id) {
                ids.push(instance.id);
            }
        }
        self.order.push(instance.id);
        self.instances.insert(instance.id, instance);
        Ok(())
    }

    pub(crate) fn push_header_record(&mut self, record: Record) {
        self.header_records.push(record);
    }

    /// Header section body, verbatim (between `HEADER;` and `ENDSEC;`).
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Header entities (`FILE_DESCRIPTION`, `FILE_NAME`, `FILE_SCHEMA`, ...).
    pub fn header_records(&self) -> &[Record] {
        &self.header_records
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the DATA sections were empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Get an instance by id.
    pub fn get(&self, id: u64) -> Option<&Instance> {
        self.instances.get(&id)
    }

    /// Get an instance by id, returning an error if not found.
    pub fn require(&self, id: u64) -> Result<&Instance, StepError> {
        self.instances.get(&id).ok_or(StepError::MissingEntity(id))
    }

    /// Instances in file order.
    pub fn iter(&self) -> impl Iterator<Item = &Instance> + '_ {
        self.order.iter().filter_map(|id| self.instances.get(id))
    }

    /// Ids in file order.
    pub fn ids(&self) -> &[u64] {
        &self.order
    }

    /// Largest instance id, 0 for an empty table.
    pub fn max_id(&self) -> u64 {
        self.order.iter().copied().max().unwrap_or(0)
    }

    /// Raw parameters of a simple instance.
    pub fn contents(&self, id: u64) -> Option<&str> {
        match &self.get(id)?.kind {
            InstanceKind::Simple(r) => Some(&r.params),
            InstanceKind::Complex(_) => None,
        }
    }

    /// Keyword of an instance, or [`COMPLEX_TYPE`].
    pub fn insttype(&self, id: u64) -> Option<&str> {
        self.get(id).map(Instance::type_name)
    }

    /// Ids carrying `keyword` in first-seen order. Complex instances are
    /// listed under every keyword they contain.
    pub fn typeinst(&self, keyword: &str) -> &[u64] {
        self.typeinst.get(keyword).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First instance of `keyword`.
    pub fn first_of_type(&self, keyword: &str) -> Option<u64> {
        self.typeinst(keyword).first().copied()
    }

    /// Decode a simple instance's parameters, checking its keyword.
    pub fn decode(&self, id: u64, keyword: &str) -> Result<Vec<StepValue>, StepError> {
        let instance = self.require(id)?;
        match &instance.kind {
            InstanceKind::Simple(r) if r.keyword == keyword => {
                parse_params(&r.params).map_err(|e| e.at_entity(id))
            }
            _ => Err(StepError::type_mismatch(keyword, instance.type_name())),
        }
    }

    /// Decode the `keyword` record of any instance, simple or complex.
    pub fn decode_record(&self, id: u64, keyword: &str) -> Result<Vec<StepValue>, StepError> {
        let instance = self.require(id)?;
        let params = instance
            .params_of(keyword)
            .ok_or_else(|| StepError::type_mismatch(keyword, instance.type_name()))?;
        parse_params(params).map_err(|e| e.at_entity(id))
    }

    /// Decode the parameters of whichever keyword `id` has, if it is one of
    /// `keywords` (subtype-tolerant lookups such as the formation variants).
    pub fn decode_any(
        &self,
        id: u64,
        keywords: &[&str],
    ) -> Result<(String, Vec<StepValue>), StepError> {
        let instance = self.require(id)?;
        for kw in keywords {
            if let Some(params) = instance.params_of(kw) {
                let values = parse_params(params).map_err(|e| e.at_entity(id))?;
                return Ok(((*kw).to_string(), values));
            }
        }
        Err(StepError::type_mismatch(keywords.join(" | "), instance.type_name()))
    }

    /// Map from every referenced id to the ids of the instances that
    /// reference it, in file order.
    pub fn reverse_references(&self) -> HashMap<u64, Vec<u64>> {
        let mut users: HashMap<u64, Vec<u64>> = HashMap::new();
        for instance in self.iter() {
            for target in instance.references() {
                let list = users.entry(target).or_default();
                if list.last() != Some(&instance.id) {
                    list.push(instance.id);
                }
            }
        }
        users
    }
}

impl PartialEq for InstanceTable {
    /// Tables compare by instance content and order; header whitespace
    /// differences are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.header.trim() == other.header.trim() && self.iter().eq(other.iter())
    }
}
