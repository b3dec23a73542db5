pub mod objects;
pub mod vector;

pub use objects::{
    ConfidenceLevel, MemoryObject, MemoryObjectKind, ObjectType, ShellPayload, ShellSource,
    ShellWrite, SuccessPathPayload, SuccessPathWrite, Validity,
};
