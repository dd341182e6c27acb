//! Inode numbers for paths.

use std::collections::HashMap;

use secretsfs_core::Path;

pub const ROOT_INODE: u64 = 1;

#[derive(Debug)]
struct Node {
    path: Path,
    /// Lookups the kernel has not yet forgotten.
    lookups: u64,
}

/// Bidirectional path/inode mapping.
///
/// Numbers are never reused. A node is dropped once the kernel has
/// forgotten every lookup of it, or, for nodes the kernel never looked up,
/// when the listing that allocated it is released. The root is permanent.
#[derive(Debug)]
pub struct InodeTable {
    by_path: HashMap<Path, u64>,
    by_inode: HashMap<u64, Node>,
    next: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        let mut table = Self {
            by_path: HashMap::new(),
            by_inode: HashMap::new(),
            next: ROOT_INODE,
        };
        table.insert(&Path::root());
        table
    }
}

impl InodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The inode of `path`, allocating one on first sight.
    pub fn insert(&mut self, path: &Path) -> u64 {
        if let Some(&inode) = self.by_path.get(path) {
            return inode;
        }
        let inode = self.next;
        self.next += 1;
        self.by_path.insert(path.clone(), inode);
        self.by_inode.insert(
            inode,
            Node {
                path: path.clone(),
                lookups: 0,
            },
        );
        inode
    }

    /// The inode of `path`, counting a lookup the kernel will later forget.
    pub fn lookup(&mut self, path: &Path) -> u64 {
        let inode = self.insert(path);
        if let Some(node) = self.by_inode.get_mut(&inode) {
            node.lookups += 1;
        }
        inode
    }

    /// Drop `nlookup` lookups of `inode`.
    pub fn forget(&mut self, inode: u64, nlookup: u64) {
        if let Some(node) = self.by_inode.get_mut(&inode) {
            node.lookups = node.lookups.saturating_sub(nlookup);
        }
        self.remove_unreferenced(inode);
    }

    /// Drop the given nodes if the kernel holds no lookup of them.
    pub fn release(&mut self, inodes: impl IntoIterator<Item = u64>) {
        for inode in inodes {
            self.remove_unreferenced(inode);
        }
    }

    fn remove_unreferenced(&mut self, inode: u64) {
        if inode == ROOT_INODE {
            return;
        }
        if let Some(node) = self.by_inode.get(&inode) {
            if node.lookups == 0 {
                self.by_path.remove(&node.path);
                self.by_inode.remove(&inode);
            }
        }
    }

    pub fn path(&self, inode: u64) -> Option<&Path> {
        self.by_inode.get(&inode).map(|node| &node.path)
    }

    pub fn len(&self) -> usize {
        self.by_inode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_inode.is_empty()
    }
}
