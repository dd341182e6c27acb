//! Synthesized file attributes and directory entries.

/// Permission bits for every directory: read and search for owner and group.
pub const DIR_PERMISSIONS: u16 = 0o550;

/// Permission bits for every regular file.
pub const FILE_PERMISSIONS: u16 = 0o440;

/// The two node kinds the filesystem exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Directory,
    File,
}

/// Attributes of a node. Nothing here is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub kind: FileKind,
    pub perm: u16,
    /// Content length, or `None` when it is only known once the file is
    /// opened (rendered templates).
    pub size: Option<u64>,
}

impl Attributes {
    pub fn directory() -> Self {
        Self {
            kind: FileKind::Directory,
            perm: DIR_PERMISSIONS,
            size: None,
        }
    }

    pub fn file(size: u64) -> Self {
        Self {
            kind: FileKind::File,
            perm: FILE_PERMISSIONS,
            size: Some(size),
        }
    }

    /// A regular file whose size is unknown until it is opened.
    pub fn on_demand_file() -> Self {
        Self {
            kind: FileKind::File,
            perm: FILE_PERMISSIONS,
            size: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// A single directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

impl DirEntry {
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileKind::Directory,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileKind::File,
        }
    }
}

/// Open flags as handed over by the transport (`O_*` bits).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags(pub i32);

impl OpenFlags {
    pub const READ_ONLY: OpenFlags = OpenFlags(libc::O_RDONLY);

    pub fn bits(&self) -> i32 {
        self.0
    }

    /// Whether the open asks for write access.
    pub fn wants_write(&self) -> bool {
        matches!(self.0 & libc::O_ACCMODE, libc::O_WRONLY | libc::O_RDWR)
    }
}
