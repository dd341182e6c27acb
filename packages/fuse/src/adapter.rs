//! `fuser::Filesystem` over the SecretsFS root.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, Request,
};
use tokio::runtime::Handle;

use secretsfs_core::{
    Attributes, Bytes, Caller, FileKind, FsError, OpenFlags, Path, SecretsFs, UserDirectory,
};

use crate::inodes::{InodeTable, ROOT_INODE};

/// The kernel caches attributes and entries across users, while every
/// answer here is specific to the caller.
const TTL: Duration = Duration::ZERO;
const BLOCK_SIZE: u32 = 512;

type Listing = Vec<(u64, FileType, String)>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Replies that can report an error code.
trait Fail {
    fn fail(self, errno: i32);
}

macro_rules! impl_fail {
    ($($reply:ty),*) => {
        $(impl Fail for $reply {
            fn fail(self, errno: i32) {
                self.error(errno)
            }
        })*
    };
}

impl_fail!(ReplyEntry, ReplyAttr, ReplyOpen);

/// State shared with the worker threads.
struct Shared {
    fs: SecretsFs,
    users: Box<dyn UserDirectory>,
    inodes: Mutex<InodeTable>,
    files: Mutex<HashMap<u64, Bytes>>,
    dirs: Mutex<HashMap<u64, Listing>>,
    next_handle: AtomicU64,
}

impl Shared {
    fn caller(&self, uid: u32, gid: u32) -> Result<Caller, FsError> {
        self.users.resolve(uid, gid).map_err(|e| {
            tracing::warn!(uid, error = %e, "cannot resolve caller");
            FsError::PermissionDenied
        })
    }

    fn path(&self, inode: u64) -> Result<Path, FsError> {
        lock(&self.inodes).path(inode).cloned().ok_or(FsError::NotFound)
    }

    fn inode(&self, path: &Path) -> u64 {
        lock(&self.inodes).insert(path)
    }

    fn handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn lookup(&self, parent: u64, name: &OsStr, caller: &Caller) -> Result<FileAttr, FsError> {
        let name = name.to_str().ok_or(FsError::NotFound)?;
        let path = self
            .path(parent)?
            .child(name)
            .map_err(|_| FsError::NotFound)?;
        let attrs = self.fs.attributes(&path, caller)?;
        let inode = lock(&self.inodes).lookup(&path);
        Ok(file_attr(inode, &attrs, caller))
    }

    fn getattr(&self, inode: u64, caller: &Caller) -> Result<FileAttr, FsError> {
        let attrs = self.fs.attributes(&self.path(inode)?, caller)?;
        Ok(file_attr(inode, &attrs, caller))
    }

    /// Snapshot the listing of `inode` into a new directory handle.
    fn opendir(&self, inode: u64, caller: &Caller) -> Result<u64, FsError> {
        let path = self.path(inode)?;
        let entries = self.fs.list(&path, caller)?;

        let parent = match path.split_last() {
            Some((parent, _)) => self.inode(&parent),
            None => ROOT_INODE,
        };
        let mut listing: Listing = Vec::with_capacity(entries.len() + 2);
        listing.push((inode, FileType::Directory, ".".to_string()));
        listing.push((parent, FileType::Directory, "..".to_string()));
        for entry in entries {
            let Ok(child) = path.child(&entry.name) else {
                tracing::debug!(%path, name = %entry.name, "skipping unrepresentable entry");
                continue;
            };
            listing.push((self.inode(&child), file_type(entry.kind), entry.name));
        }

        let fh = self.handle();
        lock(&self.dirs).insert(fh, listing);
        Ok(fh)
    }

    /// Materialize the content of `inode` into a new file handle.
    fn open(&self, inode: u64, flags: OpenFlags, caller: &Caller) -> Result<u64, FsError> {
        let content = self.fs.open(&self.path(inode)?, flags, caller)?;
        let fh = self.handle();
        lock(&self.files).insert(fh, content);
        Ok(fh)
    }
}

fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::Directory => FileType::Directory,
        FileKind::File => FileType::RegularFile,
    }
}

/// Kernel attributes for a node, owned by the caller looking at it.
fn file_attr(inode: u64, attrs: &Attributes, caller: &Caller) -> FileAttr {
    let now = SystemTime::now();
    let size = attrs.size.unwrap_or(0);
    FileAttr {
        ino: inode,
        size,
        blocks: size.div_ceil(u64::from(BLOCK_SIZE)),
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: file_type(attrs.kind),
        perm: attrs.perm,
        nlink: if attrs.is_dir() { 2 } else { 1 },
        uid: caller.uid,
        gid: caller.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// The part of `content` a read at `offset` of `size` bytes returns.
fn slice(content: &Bytes, offset: i64, size: u32) -> &[u8] {
    let start = usize::try_from(offset).unwrap_or(0).min(content.len());
    let end = start.saturating_add(size as usize).min(content.len());
    &content[start..end]
}

/// Serves kernel requests from a [`SecretsFs`].
///
/// Requests that reach the store run on the runtime's blocking pool, so one
/// slow backend call does not hold up other callers. Reads and listings are
/// served from the handles filled in by `open` and `opendir`.
pub struct SecretsFuse {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl SecretsFuse {
    pub fn new(fs: SecretsFs, users: Box<dyn UserDirectory>, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                fs,
                users,
                inodes: Mutex::new(InodeTable::new()),
                files: Mutex::new(HashMap::new()),
                dirs: Mutex::new(HashMap::new()),
                next_handle: AtomicU64::new(1),
            }),
            runtime,
        }
    }

    /// Run `op` as the requesting user on a worker thread and answer with
    /// `done`, or with the error code.
    fn serve<R, T, F, D>(&self, req: &Request<'_>, reply: R, op: F, done: D)
    where
        R: Fail + Send + 'static,
        T: 'static,
        F: FnOnce(&Shared, &Caller) -> Result<T, FsError> + Send + 'static,
        D: FnOnce(R, T) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let (uid, gid) = (req.uid(), req.gid());
        self.runtime.spawn_blocking(move || {
            let result = shared
                .caller(uid, gid)
                .and_then(|caller| op(&shared, &caller));
            match result {
                Ok(value) => done(reply, value),
                Err(e) => reply.fail(e.errno()),
            }
        });
    }
}

impl Filesystem for SecretsFuse {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = name.to_os_string();
        self.serve(
            req,
            reply,
            move |shared, caller| shared.lookup(parent, &name, caller),
            |reply, attr| reply.entry(&TTL, &attr, 0),
        );
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        lock(&self.shared.inodes).forget(ino, nlookup);
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        self.serve(
            req,
            reply,
            move |shared, caller| shared.getattr(ino, caller),
            |reply, attr| reply.attr(&TTL, &attr),
        );
    }

    fn opendir(&mut self, req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        self.serve(
            req,
            reply,
            move |shared, caller| shared.opendir(ino, caller),
            |reply, fh| reply.opened(fh, 0),
        );
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let dirs = lock(&self.shared.dirs);
        let Some(listing) = dirs.get(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let start = usize::try_from(offset).unwrap_or(0);
        for (i, (inode, kind, name)) in listing.iter().enumerate().skip(start) {
            if reply.add(*inode, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        let listing = lock(&self.shared.dirs).remove(&fh);
        if let Some(listing) = listing {
            lock(&self.shared.inodes).release(listing.into_iter().map(|(inode, _, _)| inode));
        }
        reply.ok();
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let flags = OpenFlags(flags);
        if flags.wants_write() {
            reply.error(libc::EROFS);
            return;
        }
        // Direct I/O: template sizes are only known after rendering.
        self.serve(
            req,
            reply,
            move |shared, caller| shared.open(ino, flags, caller),
            |reply, fh| reply.opened(fh, fuser::consts::FOPEN_DIRECT_IO),
        );
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let files = lock(&self.shared.files);
        match files.get(&fh) {
            Some(content) => reply.data(slice(content, offset, size)),
            None => reply.error(libc::EBADF),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        lock(&self.shared.files).remove(&fh);
        reply.ok();
    }
}
