use crate::objects::{Dictionary, Object};

/// A stream object: its dictionary plus the still-encoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub dict: Dictionary,
    pub data: Vec<u8>,
}

impl Stream {
    pub fn new(dict: Dictionary, data: Vec<u8>) -> Self {
        Self { dict, data }
    }

    /// Filter names in application order. A single `/Filter` name is returned as
    /// a one-element list.
    pub fn filters(&self) -> Vec<String> {
        match self.dict.get("Filter") {
            Some(Object::Name(name)) => vec![name.clone()],
            Some(Object::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_name().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Decode parameters aligned with [`Stream::filters`].
    pub fn decode_params(&self) -> Vec<Option<Dictionary>> {
        let count = self.filters().len();
        let key = if self.dict.contains_key("DecodeParms") {
            "DecodeParms"
        } else {
            "DP"
        };
        let mut params = match self.dict.get(key) {
            Some(Object::Dictionary(d)) => vec![Some(d.clone())],
            Some(Object::Array(items)) => items
                .iter()
                .map(|item| item.as_dict().cloned())
                .collect(),
            _ => Vec::new(),
        };
        params.resize(count, None);
        params
    }

    /// Replaces payload and encoding in one step, keeping `/Length` in sync.
    pub fn set_encoded(&mut self, data: Vec<u8>, filter: Option<&str>) {
        match filter {
            Some(name) => self.dict.set("Filter", Object::name(name)),
            None => {
                self.dict.remove("Filter");
            }
        }
        self.dict.remove("DecodeParms");
        self.dict.remove("DP");
        self.dict.set("Length", data.len());
        self.data = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_single_and_array() {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("FlateDecode"));
        let stream = Stream::new(dict, Vec::new());
        assert_eq!(stream.filters(), vec!["FlateDecode"]);

        let mut dict = Dictionary::new();
        dict.set(
            "Filter",
            vec![Object::name("ASCII85Decode"), Object::name("FlateDecode")],
        );
        let stream = Stream::new(dict, Vec::new());
        assert_eq!(stream.filters(), vec!["ASCII85Decode", "FlateDecode"]);
        assert_eq!(stream.decode_params(), vec![None, None]);
    }

    #[test]
    fn test_set_encoded_updates_length() {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("LZWDecode"));
        dict.set("DecodeParms", Dictionary::new());
        let mut stream = Stream::new(dict, vec![0; 10]);

        stream.set_encoded(vec![1, 2, 3], Some("FlateDecode"));
        assert_eq!(stream.dict.get_integer("Length"), Some(3));
        assert_eq!(stream.filters(), vec!["FlateDecode"]);
        assert!(!stream.dict.contains_key("DecodeParms"));
    }
}
