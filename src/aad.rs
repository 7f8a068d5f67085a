//! Associated-data conventions (locked).
//!
//! Every symmetric seal/open is bound to one usage context. The context's
//! byte string is passed to AES-GCM as associated data, so a blob sealed for
//! one usage fails authentication when opened as another.
//!
//! Server contexts (shared with every other client, never change these):
//!
//! | tag            | bytes            |
//! |----------------|------------------|
//! | `ItemContent`  | `b"itemcontent"` |
//! | `ItemKey`      | `b"itemkey"`     |
//! | `VaultContent` | `b"vaultcontent"`|
//! | `LinkKey`      | `b"linkkey"`     |
//! | `FileData`     | `b"filedata"`    |
//! | `FileKey`      | `b"filekey"`     |
//!
//! Device-local blobs use [`LOCAL_AAD`], which is outside the server set.

use core::fmt;

/// Associated data for blobs sealed under the device-local key.
pub const LOCAL_AAD: &[u8] = b"pass|local|v1";

/// Usage context of a symmetric ciphertext.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssociatedData {
    ItemContent,
    ItemKey,
    VaultContent,
    LinkKey,
    FileData,
    FileKey,
}

impl AssociatedData {
    pub const ALL: [AssociatedData; 6] = [
        AssociatedData::ItemContent,
        AssociatedData::ItemKey,
        AssociatedData::VaultContent,
        AssociatedData::LinkKey,
        AssociatedData::FileData,
        AssociatedData::FileKey,
    ];

    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            AssociatedData::ItemContent => b"itemcontent",
            AssociatedData::ItemKey => b"itemkey",
            AssociatedData::VaultContent => b"vaultcontent",
            AssociatedData::LinkKey => b"linkkey",
            AssociatedData::FileData => b"filedata",
            AssociatedData::FileKey => b"filekey",
        }
    }
}

impl fmt::Display for AssociatedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // as_bytes() is always ASCII
        f.write_str(core::str::from_utf8(self.as_bytes()).unwrap_or("?"))
    }
}
