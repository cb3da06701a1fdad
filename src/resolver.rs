//! Property resolution for matched device profiles.
//!
//! Values stay encoded in the dataset's value pool until a caller asks
//! for them; resolution decodes exactly the requested entries through
//! typed accessors and borrows string data in place.

use crate::binary::DatasetReader;
use crate::matcher::LeafRef;
use crate::{Error, PropertyType, Result, Value};

impl DatasetReader {
    /// Look up a property index by its exact, case-sensitive name.
    pub fn property_index(&self, name: &str) -> Option<u16> {
        self.property_name_map().get(name).copied()
    }

    /// The name of a property by index.
    pub fn property_name(&self, property_id: u16) -> Result<&str> {
        let record = self
            .property_records()
            .get(property_id as usize)
            .ok_or_else(|| Error::PropertyNotFound(format!("#{}", property_id)))?;
        self.read_pooled_str(record.name_offset)
    }

    /// The declared type of a property by index.
    pub fn property_type(&self, property_id: u16) -> Option<PropertyType> {
        self.property_records()
            .get(property_id as usize)
            .and_then(|record| PropertyType::from_tag(record.type_tag))
    }

    /// All property names, in definition order.
    pub fn property_names(&self) -> Vec<&str> {
        self.property_records()
            .iter()
            .filter_map(|record| self.read_pooled_str(record.name_offset).ok())
            .collect()
    }

    /// Resolve one property of a matched profile by name.
    ///
    /// Returns [`Error::PropertyNotFound`] when the name is not defined
    /// in the dataset or the profile does not carry the property. Both
    /// are expected outcomes for sparse profiles, not dataset faults.
    pub fn resolve(&self, leaf: LeafRef, name: &str) -> Result<Value<'_>> {
        let property_id = self
            .property_index(name)
            .ok_or_else(|| Error::PropertyNotFound(name.to_string()))?;
        self.resolve_by_id(leaf, property_id)
    }

    /// Resolve one property of a matched profile by index.
    pub fn resolve_by_id(&self, leaf: LeafRef, property_id: u16) -> Result<Value<'_>> {
        for entry in self.profile_entries(leaf.profile) {
            if entry.property_id == property_id {
                let property_type = self
                    .property_type(property_id)
                    .ok_or(Error::CorruptProperty {
                        index: property_id as u32,
                    })?;
                return self.decode_value(property_type, entry.value);
            }
        }
        Err(Error::PropertyNotFound(
            self.property_name(property_id)
                .unwrap_or("<undefined>")
                .to_string(),
        ))
    }

    /// Resolve every property the matched profile defines, in the
    /// profile's own entry order.
    pub fn resolve_all(&self, leaf: LeafRef) -> Result<Vec<(&str, Value<'_>)>> {
        let entries = self.profile_entries(leaf.profile);
        let mut resolved = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = self.property_name(entry.property_id)?;
            let property_type =
                self.property_type(entry.property_id)
                    .ok_or(Error::CorruptProperty {
                        index: entry.property_id as u32,
                    })?;
            resolved.push((name, self.decode_value(property_type, entry.value)?));
        }
        Ok(resolved)
    }

    fn decode_value(&self, property_type: PropertyType, raw: u32) -> Result<Value<'_>> {
        match property_type {
            PropertyType::Text => Ok(Value::Text(self.read_pooled_str(raw)?)),
            PropertyType::Integer => Ok(Value::Integer(raw as i32)),
            PropertyType::Boolean => Ok(Value::Boolean(raw != 0)),
            PropertyType::List => Ok(Value::List(self.read_pooled_list(raw)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::writer::{DatasetBuilder, PropertyValue};

    fn typed_dataset() -> DatasetReader {
        let mut builder = DatasetBuilder::new();
        let name = builder.add_property("DeviceName", PropertyType::Text);
        let width = builder.add_property("ScreenWidth", PropertyType::Integer);
        let mobile = builder.add_property("IsMobile", PropertyType::Boolean);
        let formats = builder.add_property("ImageFormats", PropertyType::List);

        builder
            .add_profile(vec![(name, "Unknown".into()), (mobile, false.into())])
            .unwrap();
        let phone = builder
            .add_profile(vec![
                // Deliberately not in property-id order: entry order is
                // the profile's own.
                (mobile, true.into()),
                (name, "Phone".into()),
                (width, 390.into()),
                (
                    formats,
                    PropertyValue::List(vec!["gif".to_string(), "png".to_string()]),
                ),
            ])
            .unwrap();

        builder.add_pattern("Mozilla/5.0 (iPhone", phone).unwrap();
        DatasetReader::from_bytes(builder.build().unwrap()).unwrap()
    }

    #[test]
    fn test_resolve_each_type() {
        let reader = typed_dataset();
        let leaf = reader.match_ua("Mozilla/5.0 (iPhone");

        assert_eq!(
            reader.resolve(leaf, "DeviceName").unwrap(),
            Value::Text("Phone")
        );
        assert_eq!(
            reader.resolve(leaf, "ScreenWidth").unwrap(),
            Value::Integer(390)
        );
        assert_eq!(
            reader.resolve(leaf, "IsMobile").unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            reader.resolve(leaf, "ImageFormats").unwrap(),
            Value::List(vec!["gif", "png"])
        );
    }

    #[test]
    fn test_resolve_undefined_name() {
        let reader = typed_dataset();
        let leaf = reader.match_ua("Mozilla/5.0 (iPhone");
        assert!(matches!(
            reader.resolve(leaf, "NoSuchProperty"),
            Err(Error::PropertyNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_property_absent_from_profile() {
        let reader = typed_dataset();
        let unknown = reader.match_ua("");
        // The unknown profile defines no ScreenWidth.
        assert!(matches!(
            reader.resolve(unknown, "ScreenWidth"),
            Err(Error::PropertyNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_name_is_case_sensitive() {
        let reader = typed_dataset();
        let leaf = reader.match_ua("Mozilla/5.0 (iPhone");
        assert!(matches!(
            reader.resolve(leaf, "devicename"),
            Err(Error::PropertyNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_all_preserves_profile_order() {
        let reader = typed_dataset();
        let leaf = reader.match_ua("Mozilla/5.0 (iPhone");

        let all = reader.resolve_all(leaf).unwrap();
        let names: Vec<&str> = all.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec!["IsMobile", "DeviceName", "ScreenWidth", "ImageFormats"]
        );
    }

    #[test]
    fn test_resolve_all_only_defined_properties() {
        let reader = typed_dataset();
        let defined = reader.property_names();
        let leaf = reader.match_ua("Mozilla/5.0 (iPhone");
        for (name, value) in reader.resolve_all(leaf).unwrap() {
            assert!(defined.contains(&name));
            let id = reader.property_index(name).unwrap();
            assert_eq!(reader.property_type(id).unwrap(), value.property_type());
        }
    }

    #[test]
    fn test_property_names_in_definition_order() {
        let reader = typed_dataset();
        assert_eq!(
            reader.property_names(),
            vec!["DeviceName", "ScreenWidth", "IsMobile", "ImageFormats"]
        );
    }
}
