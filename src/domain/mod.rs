//! Domain types shared between the Directory and the Node: ACLs, file
//! records, and the sentence/word model text content is structured as.

pub mod acl;
pub mod file_record;
pub mod sentence;
