//! Rule table rows

use serde::{Deserialize, Serialize};

use crate::hash::sha256_hex;
use crate::record::{Record, SyncEntity};

/// Number of classification bits a rule can constrain
pub const CLASSIFICATION_BITS: usize = 9;

/// Number of lamp outputs a rule drives
pub const OUTPUT_BITS: usize = 3;

/// Label used when a rule has no explicit status text
pub const DEFAULT_STATUS: &str = "Default Status";

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

/// One row of the rule table.
///
/// `id0..id8` are the expected values of the nine classification bits
/// (`None` = don't care). `od0..od2` are the red / amber / green lamp states
/// the rule drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMapping {
    pub id: i64,
    #[serde(default)]
    pub machine_class: Option<String>,
    #[serde(default)]
    pub status_description: Option<String>,
    #[serde(default)]
    pub rising_edge_reason_required: Option<bool>,
    #[serde(default)]
    pub falling_edge_reason_required: Option<bool>,

    /// Spindle running
    pub id0: Option<bool>,
    /// Feed hold
    pub id1: Option<bool>,
    /// Dry run
    pub id2: Option<bool>,
    /// M00 / M01 program stop
    pub id3: Option<bool>,
    /// In alarm
    pub id4: Option<bool>,
    /// In cycle
    pub id5: Option<bool>,
    /// Feed rate below 100%
    pub id6: Option<bool>,
    /// Feed rate at 100%
    pub id7: Option<bool>,
    /// Feed rate above 100%
    pub id8: Option<bool>,

    /// Red lamp
    pub od0: bool,
    /// Amber lamp
    pub od1: bool,
    /// Green lamp
    pub od2: bool,

    #[serde(default = "default_status")]
    pub input_status: String,
    #[serde(default = "default_status")]
    pub output_status: String,
}

impl Default for PatternMapping {
    fn default() -> Self {
        Self {
            id: 0,
            machine_class: None,
            status_description: None,
            rising_edge_reason_required: None,
            falling_edge_reason_required: None,
            id0: None,
            id1: None,
            id2: None,
            id3: None,
            id4: None,
            id5: None,
            id6: None,
            id7: None,
            id8: None,
            od0: false,
            od1: false,
            od2: false,
            input_status: default_status(),
            output_status: default_status(),
        }
    }
}

impl PatternMapping {
    /// Rule with the given classification expectations and lamp outputs
    pub fn new(
        id: i64,
        bits: [Option<bool>; CLASSIFICATION_BITS],
        outputs: [bool; OUTPUT_BITS],
    ) -> Self {
        let mut mapping = Self {
            id,
            ..Default::default()
        };
        mapping.set_classification_bits(bits);
        mapping.od0 = outputs[0];
        mapping.od1 = outputs[1];
        mapping.od2 = outputs[2];
        mapping
    }

    pub fn with_status(mut self, input_status: &str, output_status: &str) -> Self {
        self.input_status = input_status.to_string();
        self.output_status = output_status.to_string();
        self
    }

    pub fn classification_bits(&self) -> [Option<bool>; CLASSIFICATION_BITS] {
        [
            self.id0, self.id1, self.id2, self.id3, self.id4, self.id5, self.id6, self.id7,
            self.id8,
        ]
    }

    pub fn set_classification_bits(&mut self, bits: [Option<bool>; CLASSIFICATION_BITS]) {
        [
            self.id0, self.id1, self.id2, self.id3, self.id4, self.id5, self.id6, self.id7,
            self.id8,
        ] = bits;
    }

    pub fn output_bits(&self) -> [bool; OUTPUT_BITS] {
        [self.od0, self.od1, self.od2]
    }

    /// True when no classification bit is constrained (matches everything)
    pub fn is_catch_all(&self) -> bool {
        self.classification_bits().iter().all(Option::is_none)
    }
}

/// Everything but the key, in a fixed field order
#[derive(Serialize)]
struct HashView<'a> {
    machine_class: &'a Option<String>,
    status_description: &'a Option<String>,
    rising_edge_reason_required: Option<bool>,
    falling_edge_reason_required: Option<bool>,
    bits: [Option<bool>; CLASSIFICATION_BITS],
    outputs: [bool; OUTPUT_BITS],
    input_status: &'a str,
    output_status: &'a str,
}

impl Record for PatternMapping {
    const TYPE_TAG: &'static str = "PatternMapping";

    fn key(&self) -> i64 {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = key;
    }

    fn apply_from(&mut self, other: &Self) {
        let id = self.id;
        *self = other.clone();
        self.id = id;
    }
}

impl SyncEntity for PatternMapping {
    fn content_hash(&self) -> String {
        let view = HashView {
            machine_class: &self.machine_class,
            status_description: &self.status_description,
            rising_edge_reason_required: self.rising_edge_reason_required,
            falling_edge_reason_required: self.falling_edge_reason_required,
            bits: self.classification_bits(),
            outputs: self.output_bits(),
            input_status: &self.input_status,
            output_status: &self.output_status,
        };
        // A struct of plain fields always serializes
        let bytes = serde_json::to_vec(&view).unwrap_or_default();
        sha256_hex(bytes)
    }
}
