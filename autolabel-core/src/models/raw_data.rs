use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

const RAW_DATA_LIST: &str = "rawDataList";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLabel {
    #[default]
    Qualified,
    Unqualified,
}

/// Time-stamped annotation on a raw recording, in absolute epoch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub action_quality_label: QualityLabel,
    pub start_second: i64,
    pub start_nano_second: u32,
    pub end_second: i64,
    pub end_nano_second: u32,
}

/// Entry of `rawDataList`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDataItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Annotation>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawDataItem {
    pub fn annotations(&self) -> &[Annotation] {
        self.annotations.as_deref().unwrap_or_default()
    }
}

/// `training_data_set_meta.json`.
///
/// `rawDataList` is written back at the key position it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaDocument {
    /// Top-level fields other than `rawDataList`, e.g. `rawDataSetName`.
    pub extra: Map<String, Value>,
    pub raw_data_list: Vec<RawDataItem>,
    list_position: usize,
}

impl MetaDocument {
    /// A document whose `rawDataList` follows every other key.
    pub fn new(extra: Map<String, Value>, raw_data_list: Vec<RawDataItem>) -> Self {
        let list_position = extra.len();
        Self {
            extra,
            raw_data_list,
            list_position,
        }
    }
}

impl<'de> Deserialize<'de> for MetaDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Map::<String, Value>::deserialize(deserializer)?;

        let mut extra = Map::new();
        let mut list = None;
        let mut list_position = 0;
        for (key, value) in fields {
            if key == RAW_DATA_LIST {
                list_position = extra.len();
                list = Some(value);
            } else {
                extra.insert(key, value);
            }
        }

        let list = list.ok_or_else(|| D::Error::missing_field(RAW_DATA_LIST))?;
        let raw_data_list = serde_json::from_value(list).map_err(D::Error::custom)?;
        Ok(Self {
            extra,
            raw_data_list,
            list_position,
        })
    }
}

impl Serialize for MetaDocument {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let position = self.list_position.min(self.extra.len());
        let mut map = serializer.serialize_map(Some(self.extra.len() + 1))?;
        for (i, (key, value)) in self.extra.iter().enumerate() {
            if i == position {
                map.serialize_entry(RAW_DATA_LIST, &self.raw_data_list)?;
            }
            map.serialize_entry(key, value)?;
        }
        if position == self.extra.len() {
            map.serialize_entry(RAW_DATA_LIST, &self.raw_data_list)?;
        }
        map.end()
    }
}
