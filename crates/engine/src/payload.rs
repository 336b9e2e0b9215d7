//! Inbound order payload from the commerce platform's webhook.

use common::{GraphicVariantId, OrderId};
use serde::{Deserialize, Deserializer};

/// One line item of a paid order.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItem {
    #[serde(deserialize_with = "string_or_number")]
    pub variant_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl LineItem {
    pub fn graphic_variant_id(&self) -> GraphicVariantId {
        GraphicVariantId::new(self.variant_id.clone())
    }
}

/// A paid-order webhook payload.
///
/// The platform sends numeric ids in some payload versions and strings in
/// others, so id fields accept both.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPayload {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub order_number: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

impl OrderPayload {
    pub fn order_id(&self) -> OrderId {
        OrderId::new(self.id.clone())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(i64),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(deserializer).map(String::from)
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Option::<StringOrNumber>::deserialize(deserializer).map(|v| v.map(String::from))
}
