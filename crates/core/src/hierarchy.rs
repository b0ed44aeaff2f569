//! Folder tree construction from flat, path-based folder rows.
//!
//! All nodes live in one id-keyed arena; parent and child links are ids into
//! it. The builder is deterministic: rows are ordered by `(path_from_root, id)`
//! before anything else happens, so arrival order never changes the shape.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::catalog::FolderRow;
use crate::domain::{FolderId, FolderNode, PhotoId};
use crate::error::{Error, Result};

pub struct HierarchyBuilder {
    rows: Vec<FolderRow>,
    warnings: Vec<String>,
}

impl HierarchyBuilder {
    pub fn new(mut rows: Vec<FolderRow>) -> Self {
        rows.sort_by(|a, b| {
            a.path_from_root
                .cmp(&b.path_from_root)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut warnings = Vec::new();
        let mut seen = HashSet::new();
        rows.retain(|row| {
            if seen.insert(row.id.clone()) {
                true
            } else {
                warn!(folder = %row.id, "duplicate folder id, keeping first row");
                warnings.push(format!("duplicate folder id {} ignored", row.id));
                false
            }
        });

        Self { rows, warnings }
    }

    /// Materialize every folder.
    pub fn build(self) -> FolderTree {
        let mut tree = self.layout();
        let all: Vec<usize> = (0..tree.rows.len()).collect();
        for index in all {
            let mut node = tree.node_for_row(index);
            node.children = tree.child_ids(&node.id);
            node.has_unloaded_children = false;
            tree.insert(node);
        }
        debug!(folders = tree.nodes.len(), roots = tree.roots.len(), "built folder tree");
        tree
    }

    /// Materialize root folders only; see [`FolderTree::load_children`].
    pub fn build_lazy(self) -> FolderTree {
        let mut tree = self.layout();
        let roots: Vec<usize> = tree.roots.iter().map(|id| tree.row_index[id]).collect();
        for index in roots {
            let node = tree.node_for_row(index);
            tree.insert(node);
        }
        debug!(
            folders = tree.rows.len(),
            materialized = tree.nodes.len(),
            "built lazy folder tree"
        );
        tree
    }

    /// Resolve links, roots and orphans over the whole row set without
    /// creating any nodes.
    fn layout(self) -> FolderTree {
        let Self { rows, warnings } = self;

        let row_index: HashMap<FolderId, usize> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.id.clone(), i))
            .collect();

        let mut links: Vec<Option<FolderId>> = rows
            .iter()
            .map(|row| {
                row.parent_id
                    .clone()
                    .filter(|parent| *parent != row.id && row_index.contains_key(parent))
            })
            .collect();

        let mut child_rows: HashMap<FolderId, Vec<usize>> = HashMap::new();
        for (i, link) in links.iter().enumerate() {
            if let Some(parent) = link {
                child_rows.entry(parent.clone()).or_default().push(i);
            }
        }

        let mut tree = FolderTree {
            nodes: HashMap::new(),
            roots: Vec::new(),
            orphans: Vec::new(),
            rows,
            links: Vec::new(),
            row_index,
            child_rows,
            pending_photos: HashMap::new(),
            warnings,
        };

        break_cycles(&mut tree, &mut links);
        tree.links = links;

        for (i, row) in tree.rows.iter().enumerate() {
            if tree.links[i].is_none() {
                tree.roots.push(row.id.clone());
                if row.parent_id.is_some() {
                    tree.orphans.push(row.id.clone());
                }
            }
        }
        if !tree.orphans.is_empty() {
            debug!(orphans = tree.orphans.len(), "folders promoted to roots");
        }
        tree
    }
}

/// Detach one node from every parent cycle so that all rows are reachable
/// from a root. The detached node is the cycle member that sorts first.
fn break_cycles(tree: &mut FolderTree, links: &mut [Option<FolderId>]) {
    let mut reachable = vec![false; tree.rows.len()];
    for i in 0..tree.rows.len() {
        if links[i].is_none() {
            mark_reachable(tree, i, &mut reachable);
        }
    }

    for start in 0..tree.rows.len() {
        if reachable[start] {
            continue;
        }

        let mut path: Vec<usize> = Vec::new();
        let mut current = start;
        let cycle_start = loop {
            if let Some(pos) = path.iter().position(|&i| i == current) {
                break pos;
            }
            path.push(current);
            match &links[current] {
                Some(parent) => current = tree.row_index[parent],
                None => break path.len() - 1,
            }
        };
        let Some(&victim) = path[cycle_start..].iter().min() else {
            continue;
        };

        if let Some(parent) = links[victim].take() {
            if let Some(siblings) = tree.child_rows.get_mut(&parent) {
                siblings.retain(|&i| i != victim);
            }
        }
        let id = &tree.rows[victim].id;
        warn!(folder = %id, "folder parent cycle broken");
        tree.warnings
            .push(format!("folder {id} was part of a parent cycle; treated as a root"));
        mark_reachable(tree, victim, &mut reachable);
    }
}

fn mark_reachable(tree: &FolderTree, from: usize, reachable: &mut [bool]) {
    let mut stack = vec![from];
    while let Some(i) = stack.pop() {
        if reachable[i] {
            continue;
        }
        reachable[i] = true;
        if let Some(children) = tree.child_rows.get(&tree.rows[i].id) {
            stack.extend(children.iter().copied());
        }
    }
}

/// Arena of folder nodes plus the retained row set used for lazy loading.
#[derive(Debug, Clone)]
pub struct FolderTree {
    nodes: HashMap<FolderId, FolderNode>,
    roots: Vec<FolderId>,
    orphans: Vec<FolderId>,
    rows: Vec<FolderRow>,
    /// Linked parent per row, after cycle breaking.
    links: Vec<Option<FolderId>>,
    row_index: HashMap<FolderId, usize>,
    /// Parent id -> child row indices, in row order.
    child_rows: HashMap<FolderId, Vec<usize>>,
    /// Photos waiting for their folder to be materialized.
    pending_photos: HashMap<FolderId, Vec<PhotoId>>,
    warnings: Vec<String>,
}

impl Default for FolderTree {
    fn default() -> Self {
        HierarchyBuilder::new(Vec::new()).build()
    }
}

impl FolderTree {
    pub fn get(&self, id: &FolderId) -> Option<&FolderNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &FolderId) -> bool {
        self.nodes.contains_key(id)
    }

    /// True when the id names a folder of the catalog, loaded or not.
    pub fn is_known(&self, id: &FolderId) -> bool {
        self.row_index.contains_key(id)
    }

    pub fn root_ids(&self) -> &[FolderId] {
        &self.roots
    }

    pub fn roots(&self) -> impl Iterator<Item = &FolderNode> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Folders whose catalog parent was missing, themselves, or part of a
    /// cycle. Every orphan is also a root.
    pub fn orphans(&self) -> &[FolderId] {
        &self.orphans
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Number of materialized folders.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of folders in the catalog, including unloaded ones.
    pub fn catalog_len(&self) -> usize {
        self.rows.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FolderNode> {
        self.nodes.values()
    }

    pub fn children(&self, id: &FolderId) -> Vec<&FolderNode> {
        self.nodes
            .get(id)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|child| self.nodes.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Materialize the children of `id`. Idempotent: once loaded (or when
    /// the tree was built eagerly) the existing children are returned.
    pub fn load_children(&mut self, id: &FolderId) -> Result<Vec<FolderId>> {
        let Some(node) = self.nodes.get(id) else {
            return Err(Error::FolderNotFound(id.to_string()));
        };
        if !node.has_unloaded_children {
            return Ok(node.children.clone());
        }

        let indices = self.child_rows.get(id).cloned().unwrap_or_default();
        let mut loaded = Vec::with_capacity(indices.len());
        for index in indices {
            let child = self.node_for_row(index);
            loaded.push(child.id.clone());
            self.insert(child);
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.children = loaded.clone();
            node.has_unloaded_children = false;
        }
        debug!(folder = %id, children = loaded.len(), "loaded folder children");
        Ok(loaded)
    }

    /// Attach a photo to its folder, or queue it if the folder is not loaded
    /// yet. Returns false for a folder id the catalog does not know.
    pub fn attach_photo(&mut self, folder: &FolderId, photo: PhotoId) -> bool {
        if let Some(node) = self.nodes.get_mut(folder) {
            node.photos.push(photo);
            true
        } else if self.row_index.contains_key(folder) {
            self.pending_photos
                .entry(folder.clone())
                .or_default()
                .push(photo);
            true
        } else {
            false
        }
    }

    /// Number of parent hops up to a root.
    pub fn depth(&self, id: &FolderId) -> Option<usize> {
        let index = *self.row_index.get(id)?;
        let mut depth = 0;
        let mut link = &self.links[index];
        while let Some(parent) = link {
            depth += 1;
            link = &self.links[self.row_index[parent]];
        }
        Some(depth)
    }

    /// Materialized descendants in depth-first pre-order, excluding `id`.
    pub fn descendants(&self, id: &FolderId) -> Vec<FolderId> {
        let mut out = Vec::new();
        let mut stack: Vec<&FolderId> = match self.nodes.get(id) {
            Some(node) => node.children.iter().rev().collect(),
            None => return out,
        };
        while let Some(current) = stack.pop() {
            out.push(current.clone());
            if let Some(node) = self.nodes.get(current) {
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// Photos of `id` and every folder below it, loaded or not.
    pub fn total_photo_count(&self, id: &FolderId) -> usize {
        self.subtree(id)
            .iter()
            .map(|folder| self.photos_of(folder).len())
            .sum()
    }

    /// Photo ids of `id` and every folder below it, parents before children.
    pub fn all_photos(&self, id: &FolderId) -> Vec<PhotoId> {
        self.subtree(id)
            .iter()
            .flat_map(|folder| self.photos_of(folder).iter().cloned())
            .collect()
    }

    /// Case-insensitive lookup among the loaded children of `id`.
    pub fn find_child(&self, id: &FolderId, name: &str) -> Option<&FolderNode> {
        let wanted = name.to_lowercase();
        self.children(id)
            .into_iter()
            .find(|child| child.name.to_lowercase() == wanted)
    }

    fn photos_of(&self, id: &FolderId) -> &[PhotoId] {
        match self.nodes.get(id) {
            Some(node) => &node.photos,
            None => self
                .pending_photos
                .get(id)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        }
    }

    /// `id` plus all descendants over the full row set.
    fn subtree(&self, id: &FolderId) -> Vec<FolderId> {
        if !self.row_index.contains_key(id) {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(children) = self.child_rows.get(&current) {
                stack.extend(
                    children
                        .iter()
                        .rev()
                        .map(|&i| self.rows[i].id.clone()),
                );
            }
            out.push(current);
        }
        out
    }

    fn child_ids(&self, id: &FolderId) -> Vec<FolderId> {
        self.child_rows
            .get(id)
            .map(|indices| indices.iter().map(|&i| self.rows[i].id.clone()).collect())
            .unwrap_or_default()
    }

    fn node_for_row(&self, index: usize) -> FolderNode {
        let row = &self.rows[index];
        FolderNode {
            id: row.id.clone(),
            name: folder_name(&row.path_from_root, &row.root_path),
            full_path: full_path(&row.root_path, &row.path_from_root),
            parent_id: self.links[index].clone(),
            catalog_parent_id: row.parent_id.clone(),
            root_folder_id: row.root_folder_id.clone(),
            children: Vec::new(),
            photos: Vec::new(),
            has_unloaded_children: self.child_rows.get(&row.id).is_some_and(|c| !c.is_empty()),
        }
    }

    fn insert(&mut self, mut node: FolderNode) {
        if let Some(pending) = self.pending_photos.remove(&node.id) {
            node.photos.extend(pending);
        }
        self.nodes.insert(node.id.clone(), node);
    }
}

/// Root absolute path joined with the path-from-root, `/` separated, no
/// trailing separator.
pub fn full_path(root_path: &str, path_from_root: &str) -> PathBuf {
    let root = root_path.replace('\\', "/");
    let relative = path_from_root.replace('\\', "/");
    let relative = relative.trim_start_matches('/');

    let mut joined = if root.is_empty() {
        relative.to_string()
    } else if relative.is_empty() {
        root
    } else if root.ends_with('/') {
        format!("{root}{relative}")
    } else {
        format!("{root}/{relative}")
    };
    while joined.len() > 1 && joined.ends_with('/') {
        joined.pop();
    }
    PathBuf::from(joined)
}

/// Display name of a folder: the last segment of its path-from-root, falling
/// back to the last non-empty segment, then to the root's own name.
pub fn folder_name(path_from_root: &str, root_path: &str) -> String {
    let relative = path_from_root.replace('\\', "/");
    let trimmed = relative.strip_suffix('/').unwrap_or(&relative);
    if let Some(last) = trimmed.rsplit('/').next().filter(|s| !s.is_empty()) {
        return last.to_string();
    }
    if let Some(segment) = last_segment(&relative) {
        return segment;
    }
    last_segment(&root_path.replace('\\', "/")).unwrap_or_default()
}

fn last_segment(path: &str) -> Option<String> {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, path: &str, parent: Option<&str>) -> FolderRow {
        FolderRow::new(id, path, "/photos/", parent.map(FolderId::from))
    }

    fn id(s: &str) -> FolderId {
        FolderId::from(s)
    }

    fn sample_rows() -> Vec<FolderRow> {
        vec![
            row("1", "", None),
            row("2", "2023/", Some("1")),
            row("3", "2024/", Some("1")),
            row("4", "2023/summer/", Some("2")),
            row("5", "archive/", None),
            row("6", "lost/", Some("999")),
        ]
    }

    fn assert_consistent(tree: &FolderTree) {
        for node in tree.iter() {
            for child in &node.children {
                assert_eq!(tree.get(child).unwrap().parent_id.as_ref(), Some(&node.id));
            }
            match &node.parent_id {
                Some(parent) => assert!(tree.get(parent).unwrap().children.contains(&node.id)),
                None => assert!(tree.root_ids().contains(&node.id)),
            }
        }
    }

    #[test]
    fn test_folder_name_derivation() {
        assert_eq!(folder_name("2023/summer/", "/photos/"), "summer");
        assert_eq!(folder_name("2023/summer", "/photos/"), "summer");
        assert_eq!(folder_name("2023/summer//", "/photos/"), "summer");
        assert_eq!(folder_name("", "/Users/me/Pictures/"), "Pictures");
        assert_eq!(folder_name("/", "/Users/me/Pictures"), "Pictures");
        assert_eq!(folder_name("", "C:\\Photos\\"), "Photos");
        assert_eq!(folder_name("", ""), "");
        assert_eq!(folder_name("a\\b\\", ""), "b");
    }

    #[test]
    fn test_full_path_join() {
        assert_eq!(full_path("/photos/", "2023/"), PathBuf::from("/photos/2023"));
        assert_eq!(full_path("/photos", "/2023/"), PathBuf::from("/photos/2023"));
        assert_eq!(full_path("/photos/", ""), PathBuf::from("/photos"));
        assert_eq!(full_path("C:\\Photos\\", "trip\\"), PathBuf::from("C:/Photos/trip"));
        assert_eq!(full_path("", "trip/"), PathBuf::from("trip"));
        assert_eq!(full_path("/", ""), PathBuf::from("/"));
    }

    #[test]
    fn test_build_links_parents_and_children() {
        let tree = HierarchyBuilder::new(sample_rows()).build();
        assert_consistent(&tree);

        assert_eq!(tree.len(), 6);
        assert_eq!(tree.root_ids(), &[id("1"), id("5"), id("6")]);
        assert_eq!(tree.orphans(), &[id("6")]);

        let root = tree.get(&id("1")).unwrap();
        assert_eq!(root.name, "photos");
        assert_eq!(root.children, vec![id("2"), id("3")]);
        assert!(root.is_root());

        let summer = tree.get(&id("4")).unwrap();
        assert_eq!(summer.full_path, PathBuf::from("/photos/2023/summer"));
        assert_eq!(tree.depth(&id("4")), Some(2));

        let lost = tree.get(&id("6")).unwrap();
        assert_eq!(lost.parent_id, None);
        assert_eq!(lost.catalog_parent_id, Some(id("999")));
    }

    #[test]
    fn test_shape_is_independent_of_row_order() {
        let reference = HierarchyBuilder::new(sample_rows()).build();

        let mut reversed = sample_rows();
        reversed.reverse();
        let mut rotated = sample_rows();
        rotated.rotate_left(2);
        let mut interleaved: Vec<FolderRow> = sample_rows().into_iter().step_by(2).collect();
        interleaved.extend(sample_rows().into_iter().skip(1).step_by(2));

        for rows in [reversed, rotated, interleaved] {
            let tree = HierarchyBuilder::new(rows).build();
            assert_consistent(&tree);
            assert_eq!(tree.root_ids(), reference.root_ids());
            assert_eq!(tree.orphans(), reference.orphans());
            for node in reference.iter() {
                assert_eq!(tree.get(&node.id).unwrap().children, node.children);
            }
        }
    }

    #[test]
    fn test_self_parent_becomes_orphan_root() {
        let tree = HierarchyBuilder::new(vec![row("1", "a/", Some("1"))]).build();
        assert_eq!(tree.root_ids(), &[id("1")]);
        assert_eq!(tree.orphans(), &[id("1")]);
        assert!(tree.get(&id("1")).unwrap().children.is_empty());
    }

    #[test]
    fn test_cycle_is_broken_at_first_member() {
        let rows = vec![
            row("1", "", None),
            row("10", "b/", Some("11")),
            row("11", "a/", Some("10")),
            row("12", "0/", Some("10")),
        ];
        let tree = HierarchyBuilder::new(rows).build();
        assert_consistent(&tree);

        // "a/" sorts before "b/"; "0/" is below the cycle, not on it.
        assert_eq!(tree.root_ids(), &[id("1"), id("11")]);
        assert_eq!(tree.orphans(), &[id("11")]);
        assert_eq!(tree.get(&id("11")).unwrap().children, vec![id("10")]);
        assert_eq!(tree.get(&id("10")).unwrap().children, vec![id("12")]);
        assert_eq!(tree.depth(&id("12")), Some(2));
        assert!(tree.warnings().iter().any(|w| w.contains("cycle")));
    }

    #[test]
    fn test_duplicate_ids_keep_first_row() {
        let rows = vec![row("1", "a/", None), row("1", "b/", None)];
        let tree = HierarchyBuilder::new(rows).build();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(&id("1")).unwrap().name, "a");
        assert_eq!(tree.warnings().len(), 1);
    }

    #[test]
    fn test_lazy_load_children_is_idempotent() {
        let mut tree = HierarchyBuilder::new(sample_rows()).build_lazy();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.catalog_len(), 6);

        let root = tree.get(&id("1")).unwrap();
        assert!(root.has_unloaded_children);
        assert!(root.has_children());
        assert!(root.children.is_empty());
        assert!(!tree.get(&id("5")).unwrap().has_unloaded_children);

        assert!(tree.attach_photo(&id("4"), PhotoId::from("p1")));
        assert_eq!(tree.total_photo_count(&id("1")), 1);

        let first = tree.load_children(&id("1")).unwrap();
        assert_eq!(first, vec![id("2"), id("3")]);
        assert!(tree.get(&id("2")).unwrap().has_unloaded_children);
        assert!(!tree.get(&id("3")).unwrap().has_unloaded_children);

        let second = tree.load_children(&id("1")).unwrap();
        assert_eq!(first, second);
        assert_eq!(tree.len(), 5);

        tree.load_children(&id("2")).unwrap();
        assert_eq!(tree.get(&id("4")).unwrap().photos, vec![PhotoId::from("p1")]);
        assert_consistent(&tree);

        assert!(matches!(
            tree.load_children(&id("4242")),
            Err(Error::FolderNotFound(_))
        ));
        // Known to the catalog but not loaded yet is still "not found".
        let mut fresh = HierarchyBuilder::new(sample_rows()).build_lazy();
        assert!(fresh.load_children(&id("4")).is_err());
    }

    #[test]
    fn test_eager_load_children_changes_nothing() {
        let mut tree = HierarchyBuilder::new(sample_rows()).build();
        let before = tree.get(&id("1")).unwrap().clone();
        assert_eq!(tree.load_children(&id("1")).unwrap(), before.children);
        assert_eq!(tree.get(&id("1")).unwrap(), &before);
    }

    #[test]
    fn test_recursive_queries() {
        let mut tree = HierarchyBuilder::new(sample_rows()).build();
        tree.attach_photo(&id("1"), PhotoId::from("a"));
        tree.attach_photo(&id("2"), PhotoId::from("b"));
        tree.attach_photo(&id("4"), PhotoId::from("c"));
        assert!(!tree.attach_photo(&id("777"), PhotoId::from("x")));

        assert_eq!(tree.descendants(&id("1")), vec![id("2"), id("4"), id("3")]);
        assert_eq!(tree.total_photo_count(&id("1")), 3);
        assert_eq!(tree.total_photo_count(&id("3")), 0);
        assert_eq!(
            tree.all_photos(&id("1")),
            vec![PhotoId::from("a"), PhotoId::from("b"), PhotoId::from("c")]
        );
        assert_eq!(tree.find_child(&id("1"), "2024").unwrap().id, id("3"));
        assert_eq!(tree.find_child(&id("2"), "SUMMER").unwrap().id, id("4"));
        assert!(tree.find_child(&id("1"), "missing").is_none());
    }
}
