//! Normalized rule records.
//!
//! Conditional-formatting rules from `<conditionalFormatting>` blocks and from `extLst`
//! extension containers share one record shape ([`CfRule`]); they differ only in their
//! [`RuleSource`]. Data validations follow the same scheme ([`DvRule`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `ext` URI under which Excel 2010+ stores x14 conditional formatting.
pub const EXT_URI_X14_CONDITIONAL_FORMATTINGS: &str = "{78C0D931-6437-407d-A8EE-F0AAD7539E65}";
/// `ext` URI under which Excel 2010+ stores x14 data validations.
pub const EXT_URI_X14_DATA_VALIDATIONS: &str = "{CCE6A557-97BC-4b89-ADB6-D9C93CAAB3DF}";
/// `ext` URI linking a standard `cfRule` to its x14 counterpart (`<x14:id>`).
pub const EXT_URI_X14_CF_RULE_ID: &str = "{B025F937-C7B1-47D3-B67F-A62EFF666E3E}";

const KNOWN_EXTENSION_URIS: &[&str] = &[
    EXT_URI_X14_CONDITIONAL_FORMATTINGS,
    EXT_URI_X14_DATA_VALIDATIONS,
    EXT_URI_X14_CF_RULE_ID,
];

/// Where a rule was declared in the worksheet part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleSource {
    /// Directly in the base SpreadsheetML schema.
    #[default]
    Standard,
    /// Inside `<extLst><ext uri="...">`.
    Extension { uri: String },
}

impl RuleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSource::Standard => "standard",
            RuleSource::Extension { .. } => "extension",
        }
    }

    /// Declaring URI for extension rules, empty for standard ones.
    pub fn uri(&self) -> &str {
        match self {
            RuleSource::Standard => "",
            RuleSource::Extension { uri } => uri,
        }
    }

    /// `false` only for extension rules whose URI is not one we recognize.
    pub fn is_known(&self) -> bool {
        match self {
            RuleSource::Standard => true,
            RuleSource::Extension { uri } => KNOWN_EXTENSION_URIS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(uri)),
        }
    }
}

macro_rules! tagged_kind {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $tag:literal,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant,)*
            /// A tag we do not recognize, kept verbatim.
            Unknown(String),
        }

        impl $name {
            pub fn parse(raw: &str) -> Self {
                match raw {
                    $($tag => $name::$variant,)*
                    other => $name::Unknown(other.to_string()),
                }
            }

            /// OOXML tag, or `unknown` for unrecognized kinds.
            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $tag,)*
                    $name::Unknown(_) => "unknown",
                }
            }

            /// The tag exactly as written in the part.
            pub fn raw(&self) -> &str {
                match self {
                    $($name::$variant => $tag,)*
                    $name::Unknown(raw) => raw,
                }
            }

            pub fn is_unknown(&self) -> bool {
                matches!(self, $name::Unknown(_))
            }
        }
    };
}

tagged_kind! {
    /// `cfRule/@type`.
    CfKind {
        Expression => "expression",
        CellIs => "cellIs",
        ColorScale => "colorScale",
        DataBar => "dataBar",
        IconSet => "iconSet",
        Top10 => "top10",
        UniqueValues => "uniqueValues",
        DuplicateValues => "duplicateValues",
        ContainsText => "containsText",
        NotContainsText => "notContainsText",
        BeginsWith => "beginsWith",
        EndsWith => "endsWith",
        ContainsBlanks => "containsBlanks",
        NotContainsBlanks => "notContainsBlanks",
        ContainsErrors => "containsErrors",
        NotContainsErrors => "notContainsErrors",
        TimePeriod => "timePeriod",
        AboveAverage => "aboveAverage",
    }
}

tagged_kind! {
    /// `dataValidation/@type`. An absent attribute means `none` (any value).
    DvKind {
        None => "none",
        Whole => "whole",
        Decimal => "decimal",
        List => "list",
        Date => "date",
        Time => "time",
        TextLength => "textLength",
        Custom => "custom",
    }
}

/// One `cfvo` entry of a color scale, data bar or icon set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueStop {
    #[serde(rename = "type")]
    pub kind: String,
    /// `@val` for standard rules, `<xm:f>` text for extension rules.
    pub value: String,
    pub gte: String,
}

/// A color-like child element (`color`, `fillColor`, `axisColor`, ...) with its attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRef {
    pub role: String,
    pub attributes: BTreeMap<String, String>,
}

/// Value stops and display attributes of a visual CF kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfVisual {
    /// Attributes of the `colorScale`/`dataBar`/`iconSet` element itself.
    pub attributes: BTreeMap<String, String>,
    pub stops: Vec<ValueStop>,
    pub colors: Vec<ColorRef>,
    /// Custom icons (`x14:cfIcon`), in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<BTreeMap<String, String>>,
}

/// Kind-specific payload; present only for the visual kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfPayload {
    ColorScale(CfVisual),
    DataBar(CfVisual),
    IconSet(CfVisual),
}

/// A normalized conditional-formatting rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfRule {
    /// Whitespace-normalized `sqref` of the enclosing block.
    pub range: String,
    pub source: RuleSource,
    /// Position of the rule within its block.
    pub rule_index: usize,
    pub kind: CfKind,
    pub priority: Option<u32>,
    /// The `priority` attribute text when it is present but not a number.
    pub priority_raw: Option<String>,
    /// `dxfId` for standard rules, `inline` for extension rules carrying their own `dxf`.
    pub style_ref: Option<String>,
    pub operator: Option<String>,
    /// Formula operands, leading `=` stripped.
    pub formulas: Vec<String>,
    /// `@id` (extension rules use a GUID here).
    pub rule_id: Option<String>,
    /// `<x14:id>` inside a standard rule's own `extLst`, pointing at an extension rule.
    pub linked_extension_id: Option<String>,
    pub payload: Option<CfPayload>,
}

/// A normalized data-validation declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DvRule {
    pub range: String,
    pub source: RuleSource,
    pub kind: DvKind,
    pub operator: Option<String>,
    pub allow_blank: bool,
    pub show_error_message: bool,
    pub show_input_message: bool,
    /// Raw OOXML `showDropDown`, which *hides* the in-cell arrow when set.
    pub hide_drop_down: bool,
    pub error_style: Option<String>,
    pub error_title: Option<String>,
    pub error: Option<String>,
    pub prompt_title: Option<String>,
    pub prompt: Option<String>,
    pub formula1: Option<String>,
    pub formula2: Option<String>,
}

impl Default for DvKind {
    fn default() -> Self {
        DvKind::None
    }
}

/// Identity of a rule for cross-version comparison.
///
/// The format has no stable per-rule id across edits, so identity is the whole structural
/// tuple. Two rules differing only in range are different rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    pub range: String,
    pub kind: String,
    pub operator: String,
    pub operands: Vec<String>,
}

impl CfRule {
    pub fn key(&self) -> RuleKey {
        RuleKey {
            range: self.range.clone(),
            kind: self.kind.raw().to_string(),
            operator: self.operator.clone().unwrap_or_default(),
            operands: self.formulas.clone(),
        }
    }
}

impl DvRule {
    pub fn key(&self) -> RuleKey {
        RuleKey {
            range: self.range.clone(),
            kind: self.kind.raw().to_string(),
            operator: self.operator.clone().unwrap_or_default(),
            operands: vec![
                self.formula1.clone().unwrap_or_default(),
                self.formula2.clone().unwrap_or_default(),
            ],
        }
    }
}
