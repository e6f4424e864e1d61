use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// Deserialize a value that may be given either as a single item or as an array of items, such
/// as the JWT `aud` claim.
pub fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => vec![],
        Some(OneOrMany::One(item)) => vec![item],
        Some(OneOrMany::Many(items)) => items,
    })
}

/// Serialize a single item on its own, and anything else as an array.
pub fn serialize_one_or_many<S, T>(items: &[T], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    match items {
        [item] => item.serialize(serializer),
        items => items.serialize(serializer),
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, Serialize)]
    struct Audience {
        #[serde(
            default,
            deserialize_with = "one_or_many",
            serialize_with = "serialize_one_or_many"
        )]
        aud: Vec<String>,
    }

    #[test]
    fn single_values_and_arrays() {
        let single: Audience = serde_json::from_value(json!({ "aud": "a" })).unwrap();
        assert_eq!(single.aud, vec!["a"]);
        assert_eq!(serde_json::to_value(&single).unwrap(), json!({ "aud": "a" }));

        let many: Audience = serde_json::from_value(json!({ "aud": ["a", "b"] })).unwrap();
        assert_eq!(many.aud, vec!["a", "b"]);

        let absent: Audience = serde_json::from_value(json!({})).unwrap();
        assert!(absent.aud.is_empty());

        assert!(serde_json::from_value::<Audience>(json!({ "aud": 5 })).is_err());
    }
}
