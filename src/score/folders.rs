//! The folder hierarchy decoded alongside the unit and value tables.
//!
//! Folders form a rooted tree stored as a flat arena; nodes reference their
//! children, units and Include-category values by index. The indices come
//! straight from the file, which keeps the structure trivially cloneable and
//! free of ownership cycles. The tree is built once per load and read-only
//! afterward.

use std::io;

use crate::score::cursor::ByteCursor;
use crate::score::data::{CompileValue, UnitValue};

/// One folder node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileFolder {
    /// Folder name (one path segment), pre-lowercased by the exporter.
    pub name: String,
    /// Indices of child folders in the arena.
    pub children: Vec<u32>,
    /// Indices of units that live directly in this folder.
    pub units: Vec<u32>,
    /// Indices of Include-category values that live directly in this folder.
    pub includes: Vec<u32>,
}

/// The flat folder arena; index 0 is the root when non-empty.
#[derive(Debug, Clone, Default)]
pub struct FolderTree {
    folders: Vec<CompileFolder>,
}

impl FolderTree {
    /// All folders in arena order.
    pub fn folders(&self) -> &[CompileFolder] {
        &self.folders
    }

    /// The root folder, if the tree is non-empty.
    pub fn root(&self) -> Option<&CompileFolder> {
        self.folders.first()
    }

    pub(crate) fn decode(cursor: &mut ByteCursor<'_>) -> io::Result<FolderTree> {
        let count = cursor.read_u32()? as usize;
        let mut folders = Vec::with_capacity(count);
        for _ in 0..count {
            let name = cursor.read_string()?;
            let children = read_index_list(cursor)?;
            let units = read_index_list(cursor)?;
            let includes = read_index_list(cursor)?;
            folders.push(CompileFolder {
                name,
                children,
                units,
                includes,
            });
        }
        Ok(FolderTree { folders })
    }

    /// Relative path of unit `index`, or `""` when it is not reachable from
    /// the root.
    pub fn unit_path(&self, index: u32, name: &str) -> String {
        self.path_of(index, name, |f| &f.units)
    }

    /// Relative path of Include-category value `index`, or `""`.
    pub fn include_path(&self, index: u32, name: &str) -> String {
        self.path_of(index, name, |f| &f.includes)
    }

    fn path_of(&self, target: u32, name: &str, pick: fn(&CompileFolder) -> &Vec<u32>) -> String {
        if self.folders.is_empty() {
            return String::new();
        }
        let mut segments = Vec::new();
        if !self.search(0, target, pick, &mut segments) {
            return String::new();
        }
        let mut path = String::new();
        for segment in segments {
            path.push_str(segment);
            path.push('/');
        }
        path.push_str(name);
        path
    }

    fn search<'a>(
        &'a self,
        folder: usize,
        target: u32,
        pick: fn(&CompileFolder) -> &Vec<u32>,
        segments: &mut Vec<&'a str>,
    ) -> bool {
        let node = match self.folders.get(folder) {
            Some(node) => node,
            None => return false,
        };
        if pick(node).contains(&target) {
            return true;
        }
        for &child in &node.children {
            if let Some(sub) = self.folders.get(child as usize) {
                segments.push(&sub.name);
                if self.search(child as usize, target, pick, segments) {
                    return true;
                }
                segments.pop();
            }
        }
        false
    }

    /// Resolves `path` to a unit index by walking folder names segment by
    /// segment, then scanning the terminal folder's direct units by name.
    pub fn resolve_unit(&self, path: &str, units: &[UnitValue]) -> Option<u32> {
        self.resolve(path, |folder, file| {
            folder
                .units
                .iter()
                .copied()
                .find(|&u| units.get(u as usize).map(|u| u.name.as_str()) == Some(file))
        })
    }

    /// Resolves `path` to an Include-category value index.
    pub fn resolve_include(&self, path: &str, values: &[CompileValue]) -> Option<u32> {
        self.resolve(path, |folder, file| {
            folder
                .includes
                .iter()
                .copied()
                .find(|&v| values.get(v as usize).map(|v| v.name.as_str()) == Some(file))
        })
    }

    fn resolve(
        &self,
        path: &str,
        find: impl Fn(&CompileFolder, &str) -> Option<u32>,
    ) -> Option<u32> {
        // Unit names come out of Windows-flavored build logs, so accept both
        // separators on the way back in.
        let mut segments = path
            .split(|c| c == '/' || c == '\\')
            .filter(|s| !s.is_empty());
        let file = segments.next_back()?;

        let mut current = self.root()?;
        for segment in segments {
            let next = current.children.iter().copied().find(|&c| {
                self.folders
                    .get(c as usize)
                    .map(|f| f.name == segment)
                    .unwrap_or(false)
            })?;
            current = &self.folders[next as usize];
        }
        find(current, file)
    }
}

fn read_index_list(cursor: &mut ByteCursor<'_>) -> io::Result<Vec<u32>> {
    let count = cursor.read_u32()? as usize;
    let mut list = Vec::with_capacity(count);
    for _ in 0..count {
        list.push(cursor.read_u32()?);
    }
    Ok(list)
}
