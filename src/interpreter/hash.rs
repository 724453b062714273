use crate::interpreter::object::{Locked, Object};

use murmurhash3::murmurhash3_x64_128;
use num_bigint::BigInt;

/// Identity of a value for map keys, set members and `==` on composites.
///
/// All integer variants share the `Number` tag and hash by their value,
/// so `1`, `0x1` and `1n` land on the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashKey {
    pub tag: HashTag,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashTag {
    Number,
    Float,
    Decimal,
    Boolean,
    Null,
    Ignore,
    Str,
    List,
    Map,
    Set,
    Function,
    Builtin,
    Error,
    Module,
    Process,
    Host,
}

impl Object {
    pub fn hash_key(&self) -> HashKey {
        let mut buffer = vec![];
        let tag = self.write_hash(&mut buffer);
        let (high, low) = murmurhash3_x64_128(&buffer, 0);

        HashKey {
            tag,
            value: high ^ low,
        }
    }

    // Appends the hashed representation of `self` to `buffer`.
    fn write_hash(&self, buffer: &mut Vec<u8>) -> HashTag {
        let tag = match self {
            Object::Integer(n) => {
                buffer.extend(BigInt::from(*n).to_signed_bytes_le());
                HashTag::Number
            }
            Object::UInteger(n) => {
                buffer.extend(BigInt::from(*n).to_signed_bytes_le());
                HashTag::Number
            }
            Object::BigInteger(n) => {
                buffer.extend(n.to_signed_bytes_le());
                HashTag::Number
            }
            Object::Float(x) => {
                buffer.extend(x.to_bits().to_le_bytes());
                HashTag::Float
            }
            Object::BigFloat(x) => {
                buffer.extend(x.normalized().to_string().bytes());
                HashTag::Decimal
            }
            Object::Boolean(b) => {
                buffer.push(*b as u8);
                HashTag::Boolean
            }
            Object::Null => HashTag::Null,
            Object::Ignore => HashTag::Ignore,
            Object::Str(text) => {
                buffer.extend(text.bytes());
                HashTag::Str
            }
            Object::List(items) => {
                for item in items.read_lock().iter() {
                    write_nested(item, buffer);
                }
                HashTag::List
            }
            Object::Map(map) => {
                for (key, value) in map.read_lock().iter() {
                    write_nested(key, buffer);
                    write_nested(value, buffer);
                }
                HashTag::Map
            }
            Object::Set(set) => {
                // members are combined order-independently
                let mut members: Vec<HashKey> = set.read_lock().iter().map(Object::hash_key).collect();
                members.sort();
                for member in members {
                    buffer.push(member.tag as u8);
                    buffer.extend(member.value.to_le_bytes());
                }
                HashTag::Set
            }
            Object::Function(function) => {
                buffer.extend((std::sync::Arc::as_ptr(&function.body) as usize).to_le_bytes());
                buffer.extend(function.env.addr().to_le_bytes());
                HashTag::Function
            }
            Object::Builtin(builtin) => {
                buffer.extend(builtin.name.bytes());
                HashTag::Builtin
            }
            Object::Return(obj) => return obj.write_hash(buffer),
            Object::Break | Object::Continue => HashTag::Null,
            Object::Error(error) => {
                buffer.extend(error.to_string().bytes());
                HashTag::Error
            }
            Object::Module(module) => {
                buffer.extend(module.env.addr().to_le_bytes());
                HashTag::Module
            }
            Object::Process(pid) => {
                buffer.extend(pid.to_le_bytes());
                HashTag::Process
            }
            Object::Host(host) => {
                buffer.extend(host.id.to_le_bytes());
                HashTag::Host
            }
        };

        tag
    }
}

fn write_nested(obj: &Object, buffer: &mut Vec<u8>) {
    let key = obj.hash_key();
    buffer.push(key.tag as u8);
    buffer.extend(key.value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::object::{OrderedMap, OrderedSet};

    use std::str::FromStr;

    use test_case::test_case;

    #[test_case(Object::Integer(1), Object::UInteger(1) ; "int and uint")]
    #[test_case(Object::Integer(-7), Object::big_integer(BigInt::from(-7)) ; "int and bigint")]
    #[test_case(Object::string("abc"), Object::string("abc") ; "strings")]
    #[test_case(
        Object::list(vec![Object::Integer(1), Object::string("a")]),
        Object::list(vec![Object::Integer(1), Object::string("a")]) ;
        "lists"
    )]
    #[test_case(
        Object::set(vec![Object::Integer(1), Object::Integer(2)].into_iter().collect::<OrderedSet>()),
        Object::set(vec![Object::Integer(2), Object::Integer(1)].into_iter().collect::<OrderedSet>()) ;
        "sets ignore order"
    )]
    fn equal_hashes(a: Object, b: Object) {
        assert_eq!(a.hash_key(), b.hash_key())
    }

    #[test_case(Object::Integer(-1), Object::UInteger(u64::MAX) ; "sign matters")]
    #[test_case(Object::Integer(1), Object::Float(1.0) ; "int and float")]
    #[test_case(Object::string("1"), Object::Integer(1) ; "string and int")]
    #[test_case(
        Object::list(vec![Object::Integer(1), Object::Integer(2)]),
        Object::list(vec![Object::Integer(2), Object::Integer(1)]) ;
        "list order matters"
    )]
    fn distinct_hashes(a: Object, b: Object) {
        assert_ne!(a.hash_key(), b.hash_key())
    }

    #[test]
    fn map_order_matters() {
        let ab: OrderedMap = vec![
            (Object::string("a"), Object::Integer(1)),
            (Object::string("b"), Object::Integer(2)),
        ]
        .into_iter()
        .collect();
        let ba: OrderedMap = vec![
            (Object::string("b"), Object::Integer(2)),
            (Object::string("a"), Object::Integer(1)),
        ]
        .into_iter()
        .collect();

        assert_ne!(Object::map(ab).hash_key(), Object::map(ba).hash_key());
    }

    #[test]
    fn decimals_normalize() {
        let a = Object::big_float(bigdecimal::BigDecimal::from_str("1.50").unwrap());
        let b = Object::big_float(bigdecimal::BigDecimal::from_str("1.5").unwrap());
        assert_eq!(a.hash_key(), b.hash_key())
    }
}
