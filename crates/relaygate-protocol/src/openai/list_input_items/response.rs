use serde::{Deserialize, Serialize};

use crate::openai::create_response::types::InputItem;
use crate::openai::list_response_items::types::ResponseItemListObjectType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListInputItemsResponse {
    pub object: ResponseItemListObjectType,
    pub data: Vec<InputItem>,
    pub first_id: String,
    pub last_id: String,
    pub has_more: bool,
}
