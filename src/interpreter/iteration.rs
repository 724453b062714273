use crate::interpreter::object::{Locked, Object, OrderedMap};

use std::sync::{Arc, RwLock};

/// Explicit iterator driving `for (x in xs)` loops and comprehensions.
///
/// Lists are read live so a loop body may append to the list it walks;
/// maps yield `[key, value]` pairs in insertion order; strings yield one
/// string per codepoint.
pub enum Cursor {
    List {
        items: Arc<RwLock<Vec<Object>>>,
        index: usize,
    },
    Map {
        map: Arc<RwLock<OrderedMap>>,
        index: usize,
    },
    Items(std::vec::IntoIter<Object>),
}

impl Cursor {
    pub fn new(iterable: &Object) -> Option<Cursor> {
        let cursor = match iterable {
            Object::List(items) => Cursor::List {
                items: items.clone(),
                index: 0,
            },
            Object::Map(map) => Cursor::Map {
                map: map.clone(),
                index: 0,
            },
            Object::Set(set) => {
                let items: Vec<Object> = set.read_lock().iter().cloned().collect();
                Cursor::Items(items.into_iter())
            }
            Object::Str(text) => {
                let items: Vec<Object> = text
                    .chars()
                    .map(|ch| Object::string(ch.to_string()))
                    .collect();
                Cursor::Items(items.into_iter())
            }
            _ => return None,
        };

        Some(cursor)
    }
}

impl Iterator for Cursor {
    type Item = Object;

    fn next(&mut self) -> Option<Object> {
        match self {
            Cursor::List { items, index } => {
                let item = items.read_lock().get(*index).cloned()?;
                *index += 1;
                Some(item)
            }
            Cursor::Map { map, index } => {
                let (key, value) = map.read_lock().entry_at(*index)?;
                *index += 1;
                Some(Object::list(vec![key, value]))
            }
            Cursor::Items(items) => items.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn strings_iterate_by_codepoint() {
        let items: Vec<Object> = Cursor::new(&Object::string("añb")).unwrap().collect();
        assert_eq!(
            items,
            vec![Object::string("a"), Object::string("ñ"), Object::string("b")]
        );
    }

    #[test]
    fn maps_yield_pairs_in_order() {
        let map: OrderedMap = vec![
            (Object::Integer(2), Object::string("b")),
            (Object::Integer(1), Object::string("a")),
        ]
        .into_iter()
        .collect();
        let items: Vec<Object> = Cursor::new(&Object::map(map)).unwrap().collect();

        assert_eq!(
            items,
            vec![
                Object::list(vec![Object::Integer(2), Object::string("b")]),
                Object::list(vec![Object::Integer(1), Object::string("a")]),
            ]
        );
    }

    #[test]
    fn lists_are_read_live() {
        let list = Object::list(vec![Object::Integer(1)]);
        let mut cursor = Cursor::new(&list).unwrap();
        assert_eq!(cursor.next(), Some(Object::Integer(1)));

        if let Object::List(items) = &list {
            items.write_lock().push(Object::Integer(2));
        }
        assert_eq!(cursor.next(), Some(Object::Integer(2)));
        assert_eq!(cursor.next(), None);
    }

    #[test]
    fn numbers_are_not_iterable() {
        assert!(Cursor::new(&Object::Integer(3)).is_none());
    }
}
