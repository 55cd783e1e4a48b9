//! Batch item lists carried in the request payload

use super::names;
use crate::data::Data;

/// Item names of a batch request, if the payload carries an `:ItemList`
pub fn item_names(payload: &Data) -> Option<Vec<String>> {
    let array = payload
        .as_element_list()?
        .get(names::ITEM_LIST)?
        .as_array()?;
    array
        .items()
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}
