//! Field views carried in the request payload

use super::names;
use crate::common::errors::{ValidationError, ValidationResult};
use crate::data::{Data, ElementList, OmmArray};
use crate::protocol::DataType;

/// `:ViewType` value for a list of field ids
pub const VIEW_FIELD_ID_LIST: u64 = 1;
/// `:ViewType` value for a list of element names
pub const VIEW_ELEMENT_NAME_LIST: u64 = 2;

/// Build a request payload carrying an optional view and an optional batch item list
///
/// Returns [`Data::NoData`] when neither is present.
pub fn request_payload(view: Option<&[i16]>, batch: Option<&[String]>) -> ValidationResult<Data> {
    if view.is_none() && batch.is_none() {
        return Ok(Data::NoData);
    }
    let mut elements = ElementList::new();
    if let Some(fids) = view {
        if fids.is_empty() {
            return Err(ValidationError::invalid("view", "no field ids"));
        }
        let mut array = OmmArray::new(DataType::Int);
        for fid in fids {
            array.add_int(*fid as i64)?;
        }
        array.complete()?;
        elements
            .add_uint(names::VIEW_TYPE, VIEW_FIELD_ID_LIST)?
            .add_entry(names::VIEW_DATA, array)?;
    }
    if let Some(items) = batch {
        if items.is_empty() {
            return Err(ValidationError::invalid("batch", "no item names"));
        }
        let mut array = OmmArray::new(DataType::AsciiString);
        for item in items {
            array.add_ascii(item.clone())?;
        }
        array.complete()?;
        elements.add_entry(names::ITEM_LIST, array)?;
    }
    elements.complete()?;
    Ok(Data::ElementList(elements))
}

/// Field ids of a `:ViewType` 1 view, if the payload carries one
pub fn field_ids(payload: &Data) -> Option<Vec<i16>> {
    let elements = payload.as_element_list()?;
    if elements.get(names::VIEW_TYPE).and_then(Data::as_u64) != Some(VIEW_FIELD_ID_LIST) {
        return None;
    }
    let array = elements.get(names::VIEW_DATA)?.as_array()?;
    array
        .items()
        .iter()
        .map(|item| item.as_i64().and_then(|fid| i16::try_from(fid).ok()))
        .collect()
}

/// Strip the batch item list, keeping any view
pub fn without_batch(payload: &Data) -> ValidationResult<Data> {
    request_payload(field_ids(payload).as_deref(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdm::batch;

    #[test]
    fn view_and_batch_share_one_payload() {
        let names = vec!["IBM.N".to_string(), "MSFT.O".to_string()];
        let payload = request_payload(Some(&[22, 25]), Some(&names)).unwrap();
        assert_eq!(field_ids(&payload), Some(vec![22, 25]));
        assert_eq!(batch::item_names(&payload), Some(names));

        let stripped = without_batch(&payload).unwrap();
        assert_eq!(field_ids(&stripped), Some(vec![22, 25]));
        assert_eq!(batch::item_names(&stripped), None);
    }

    #[test]
    fn empty_request_payload_is_no_data() {
        assert_eq!(request_payload(None, None).unwrap(), Data::NoData);
        assert!(request_payload(Some(&[]), None).is_err());
    }
}
