//! Defines [`build_tree`], which classifies a flat collection of tagged items
//! into a rose tree. Descending one branch of the tree means "choosing" a tag:
//! every item in a node under that branch carries the tag.
//!
//! Two rules shape the tree:
//!
//! 1. A node's item list holds exactly the items whose tag set equals the set
//!    of tags on the path from the root to the node. Not a superset.
//! 2. If the items carrying tag `B` are a strict subset of the items carrying
//!    tag `A`, then `B` is only offered as a branch once `A` has been chosen.
//!
//! For example, the items
//!
//! ```text
//! tree.png | [png, nature]
//! rose.png | [png, nature, flower]
//! bush.png | [png, nature]
//! math.txt | [txt, school]
//! blue.iso | []
//! ```
//!
//! are classified as
//!
//! ```text
//! •─ [blue.iso]
//!    ├── nature: []
//!    │   └── png: [bush.png, tree.png]
//!    │       └── flower: [rose.png]
//!    ├── png: []
//!    │   └── nature: [bush.png, tree.png]
//!    │       └── flower: [rose.png]
//!    ├── school: []
//!    │   └── txt: [math.txt]
//!    └── txt: []
//!        └── school: [math.txt]
//! ```
//!
//! Since `school` and `txt` label the same items, neither is a strict subset
//! of the other and both appear at the top level. `math.txt` therefore shows
//! up twice, at two nodes whose paths are the same set of tags. The same goes
//! for `png` and `nature`. `flower`, on the other hand, labels a strict subset
//! of both and is only offered once they have been chosen.

use std::collections::{BTreeMap, BTreeSet};

/// The projection of an item that the classification needs: a title used to
/// order items within a node, and a set of tags.
pub trait Tagged {
    fn title(&self) -> &str;
    fn tags(&self) -> &BTreeSet<String>;
}

impl<T: Tagged + ?Sized> Tagged for &T {
    fn title(&self) -> &str {
        (**self).title()
    }

    fn tags(&self) -> &BTreeSet<String> {
        (**self).tags()
    }
}

/// A node in the classification tree. Items are borrowed from the collection
/// passed to [`build_tree`].
#[derive(Debug)]
pub struct TreeNode<'a, T> {
    /// The tag chosen to reach this node. `None` only for the root.
    pub tag: Option<String>,

    /// The items whose tag set is exactly the set of tags on this node's
    /// path, ordered by title.
    pub items: Vec<&'a T>,

    /// One child per additional tag, ordered by tag.
    pub children: Vec<TreeNode<'a, T>>,
}

impl<'a, T> TreeNode<'a, T> {
    /// Visits every node depth-first, passing the path of tags leading to it
    /// (including its own tag; empty for the root).
    pub fn walk<F>(&self, f: &mut F)
    where
        F: FnMut(&[&str], &TreeNode<'a, T>),
    {
        let mut path = Vec::new();
        self.walk_aux(&mut path, f);
    }

    fn walk_aux<'s, F>(&'s self, path: &mut Vec<&'s str>, f: &mut F)
    where
        F: FnMut(&[&str], &TreeNode<'a, T>),
    {
        if let Some(tag) = &self.tag {
            path.push(tag);
        }
        f(path, self);
        for child in &self.children {
            child.walk_aux(path, f);
        }
        if self.tag.is_some() {
            path.pop();
        }
    }

    /// The number of nodes in the tree rooted at `self`.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(TreeNode::node_count)
            .sum::<usize>()
    }
}

/// Classifies `items` by tag. See the module documentation for the shape of
/// the result. The output depends only on the items, their titles, and their
/// tags; items with equal titles keep their relative input order.
pub fn build_tree<T: Tagged>(items: &[T]) -> TreeNode<'_, T> {
    let index = Index::new(items);
    let universe: Vec<&str> = index.by_tag.keys().copied().collect();
    index.node(None, &BTreeSet::new(), &universe)
}

/// Memoizes, for every tag, the positions of the items carrying it. The
/// lookup is always against the whole collection, never the items remaining
/// under some path.
struct Index<'a, T> {
    items: &'a [T],
    by_tag: BTreeMap<&'a str, BTreeSet<usize>>,
}

impl<'a, T: Tagged> Index<'a, T> {
    fn new(items: &'a [T]) -> Self {
        let mut by_tag: BTreeMap<&'a str, BTreeSet<usize>> = BTreeMap::new();
        for (i, item) in items.iter().enumerate() {
            for tag in item.tags() {
                by_tag.entry(tag.as_str()).or_default().insert(i);
            }
        }
        Index { items, by_tag }
    }

    fn items_with(&self, tag: &str) -> &BTreeSet<usize> {
        // every tag in a universe came from `by_tag`
        &self.by_tag[tag]
    }

    /// True if the items with `outer` are a strict superset of the items with
    /// `inner`.
    fn strictly_contains(&self, outer: &str, inner: &str) -> bool {
        let outer = self.items_with(outer);
        let inner = self.items_with(inner);
        outer.len() > inner.len() && inner.is_subset(outer)
    }

    fn is_branch(&self, path: &BTreeSet<&str>, tag: &str, universe: &[&str]) -> bool {
        let nonempty = self.items_with(tag).iter().any(|&i| {
            let tags = self.items[i].tags();
            path.iter().all(|p| tags.contains(*p))
        });

        nonempty
            && !universe
                .iter()
                .any(|other| self.strictly_contains(other, tag))
    }

    fn node(
        &self,
        tag: Option<&str>,
        path: &BTreeSet<&'a str>,
        universe: &[&'a str],
    ) -> TreeNode<'a, T> {
        let mut items: Vec<&'a T> = self
            .items
            .iter()
            .filter(|item| {
                let tags = item.tags();
                tags.len() == path.len() && path.iter().all(|p| tags.contains(*p))
            })
            .collect();
        items.sort_by(|a, b| a.title().cmp(b.title()));

        let children = universe
            .iter()
            .copied()
            .filter(|child| self.is_branch(path, child, universe))
            .map(|child| {
                let mut child_path = path.clone();
                child_path.insert(child);
                let remaining: Vec<&'a str> =
                    universe.iter().copied().filter(|t| *t != child).collect();
                self.node(Some(child), &child_path, &remaining)
            })
            .collect();

        TreeNode {
            tag: tag.map(str::to_owned),
            items,
            children,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Entry {
        title: String,
        tags: BTreeSet<String>,
    }

    impl Tagged for Entry {
        fn title(&self) -> &str {
            &self.title
        }

        fn tags(&self) -> &BTreeSet<String> {
            &self.tags
        }
    }

    fn entry(title: &str, tags: &[&str]) -> Entry {
        Entry {
            title: title.to_owned(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn titles<'n, T: Tagged>(node: &'n TreeNode<'_, T>) -> Vec<&'n str> {
        node.items.iter().map(|i| i.title()).collect()
    }

    fn tags<'n, T>(node: &'n TreeNode<'_, T>) -> Vec<&'n str> {
        node.children
            .iter()
            .map(|c| c.tag.as_deref().unwrap_or_default())
            .collect()
    }

    fn example() -> Vec<Entry> {
        vec![
            entry("tree", &["png", "nature"]),
            entry("rose", &["png", "nature", "flower"]),
            entry("bush", &["png", "nature"]),
            entry("math", &["txt", "school"]),
            entry("blue", &[]),
        ]
    }

    #[test]
    fn test_example_tree() {
        let items = example();
        let root = build_tree(&items);

        assert_eq!(None, root.tag);
        assert_eq!(vec!["blue"], titles(&root));
        assert_eq!(vec!["nature", "png", "school", "txt"], tags(&root));

        let png = &root.children[1];
        assert!(png.items.is_empty());
        assert_eq!(vec!["nature"], tags(png));

        let nature = &png.children[0];
        assert_eq!(vec!["bush", "tree"], titles(nature));
        assert_eq!(vec!["flower"], tags(nature));

        let flower = &nature.children[0];
        assert_eq!(vec!["rose"], titles(flower));
        assert!(flower.children.is_empty());

        let nature = &root.children[0];
        assert!(nature.items.is_empty());
        assert_eq!(vec!["png"], tags(nature));
        assert_eq!(vec!["bush", "tree"], titles(&nature.children[0]));

        let school = &root.children[2];
        assert!(school.items.is_empty());
        assert_eq!(vec!["txt"], tags(school));
        assert_eq!(vec!["math"], titles(&school.children[0]));

        let txt = &root.children[3];
        assert!(txt.items.is_empty());
        assert_eq!(vec!["school"], tags(txt));
        assert_eq!(vec!["math"], titles(&txt.children[0]));

        assert_eq!(11, root.node_count());
    }

    #[test]
    fn test_empty_input() {
        let items: Vec<Entry> = Vec::new();
        let root = build_tree(&items);
        assert_eq!(None, root.tag);
        assert!(root.items.is_empty());
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_all_untagged() {
        let items = vec![entry("b", &[]), entry("a", &[]), entry("c", &[])];
        let root = build_tree(&items);
        assert_eq!(vec!["a", "b", "c"], titles(&root));
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_strict_subset_only_nested() {
        // `rust` labels a strict subset of `code`.
        let items = vec![
            entry("parser", &["code", "rust"]),
            entry("script", &["code"]),
        ];
        let root = build_tree(&items);
        assert_eq!(vec!["code"], tags(&root));

        let code = &root.children[0];
        assert_eq!(vec!["script"], titles(code));
        assert_eq!(vec!["rust"], tags(code));
        assert_eq!(vec!["parser"], titles(&code.children[0]));
    }

    #[test]
    fn test_suppressed_by_tag_off_path() {
        // Under `a`, `c` is still suppressed because `b` (which remains in
        // the universe) strictly contains it, so `c` is only reached via `b`.
        let items = vec![
            entry("one", &["a", "b", "c"]),
            entry("two", &["b"]),
            entry("three", &["a"]),
        ];
        let root = build_tree(&items);
        assert_eq!(vec!["a", "b"], tags(&root));

        let a = &root.children[0];
        assert_eq!(vec!["three"], titles(a));
        assert_eq!(vec!["b"], tags(a));
        assert_eq!(vec!["c"], tags(&a.children[0]));
        assert_eq!(vec!["one"], titles(&a.children[0].children[0]));
    }

    #[test]
    fn test_items_with_equal_titles_keep_input_order() {
        let items = vec![entry("same", &["x"]), entry("same", &["x"])];
        let root = build_tree(&items);
        let x = &root.children[0];
        assert!(std::ptr::eq(x.items[0], &items[0]));
        assert!(std::ptr::eq(x.items[1], &items[1]));
    }

    #[test]
    fn test_walk_reports_paths() {
        let items = example();
        let root = build_tree(&items);
        let mut paths = Vec::new();
        root.walk(&mut |path, _| paths.push(path.join("/")));
        assert_eq!(
            vec![
                "",
                "nature",
                "nature/png",
                "nature/png/flower",
                "png",
                "png/nature",
                "png/nature/flower",
                "school",
                "school/txt",
                "txt",
                "txt/school",
            ],
            paths
        );
    }
}
