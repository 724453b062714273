use crate::error::ErrorKind;

use std::fmt;

/// Payload of [`Object::Error`](crate::interpreter::Object::Error).
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorObject {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Exit(code) => write!(f, "exit({})", code),
            kind => write!(f, "{}: {}", kind, self.message),
        }
    }
}

impl std::error::Error for ErrorObject {}

impl ErrorObject {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> ErrorObject {
        ErrorObject {
            kind,
            message: message.into(),
        }
    }

    pub fn type_mismatch<S: Into<String>>(msg: S) -> ErrorObject {
        ErrorObject::new(ErrorKind::Type, format!("type mismatch: `{}`", msg.into()))
    }

    pub fn unknown_name(name: &str) -> ErrorObject {
        ErrorObject::new(ErrorKind::Name, format!("identifier not found: `{}`", name))
    }

    pub fn immutable(name: &str) -> ErrorObject {
        ErrorObject::new(
            ErrorKind::Name,
            format!("cannot assign to immutable value `{}`", name),
        )
    }

    pub fn wrong_number_of_args(name: &str, got: usize, want: &str) -> ErrorObject {
        ErrorObject::new(
            ErrorKind::Argument,
            format!(
                "wrong number of arguments to `{}`: got {}, want {}",
                name, got, want
            ),
        )
    }

    pub fn wrong_arg_type(name: &str, position: usize, expected: &str, got: &str) -> ErrorObject {
        ErrorObject::new(
            ErrorKind::Argument,
            format!(
                "argument {} to `{}` must be {}, got {}",
                position, name, expected, got
            ),
        )
    }

    pub fn division_by_zero() -> ErrorObject {
        ErrorObject::new(ErrorKind::Arithmetic, "Division by zero")
    }

    pub fn runtime<S: Into<String>>(msg: S) -> ErrorObject {
        ErrorObject::new(ErrorKind::Runtime, msg)
    }

    pub fn import<S: Into<String>>(msg: S) -> ErrorObject {
        ErrorObject::new(ErrorKind::Import, msg)
    }

    pub fn exit(code: i32) -> ErrorObject {
        ErrorObject::new(ErrorKind::Exit(code), format!("exit({})", code))
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.kind, ErrorKind::Exit(_))
    }
}
