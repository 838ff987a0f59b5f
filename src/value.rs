//! Conversions from items, the classification tree, and YAML into template
//! [`Value`]s.

use crate::item::{Item, Target};
use crate::tree::TreeNode;
use gtmpl_value::Value;
use std::collections::HashMap;

impl From<&Item> for Value {
    /// Converts an [`Item`] into a [`Value::Object`] with fields `title`,
    /// `tags`, `abstract`, `href`, `target`, and `location`.
    fn from(item: &Item) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("title".to_owned(), Value::String(item.title.clone()));
        m.insert(
            "tags".to_owned(),
            Value::Array(item.tags.iter().cloned().map(Value::String).collect()),
        );
        m.insert(
            "abstract".to_owned(),
            match &item.description {
                Some(description) => Value::String(description.clone()),
                None => Value::Nil,
            },
        );
        m.insert("href".to_owned(), Value::String(item.href.clone()));
        m.insert(
            "target".to_owned(),
            Value::String(match &item.target {
                Target::Path(path) => path.display().to_string(),
                Target::Url(url) => url.to_string(),
            }),
        );
        m.insert(
            "location".to_owned(),
            Value::String(item.location.display().to_string()),
        );
        Value::Object(m)
    }
}

/// Converts a classification tree node into a [`Value::Object`] with fields
/// `tag`, `items`, `children`, and `anchor`. The anchor is the slugified path
/// of tags leading to the node, usable as an HTML id.
pub fn tree_value(node: &TreeNode<&Item>) -> Value {
    fn aux(node: &TreeNode<&Item>, path: &mut Vec<String>) -> Value {
        if let Some(tag) = &node.tag {
            path.push(tag.clone());
        }

        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert(
            "tag".to_owned(),
            match &node.tag {
                Some(tag) => Value::String(tag.clone()),
                None => Value::Nil,
            },
        );
        m.insert("anchor".to_owned(), Value::String(slug::slugify(path.join("-"))));
        m.insert("items".to_owned(), items_value(&node.items));
        m.insert(
            "children".to_owned(),
            Value::Array(node.children.iter().map(|c| aux(c, path)).collect()),
        );

        if node.tag.is_some() {
            path.pop();
        }
        Value::Object(m)
    }

    aux(node, &mut Vec::new())
}

fn items_value(items: &[&&Item]) -> Value {
    Value::Array(items.iter().map(|item| Value::from(**item)).collect())
}

/// Builds the values every template is rendered with:
///
/// * `items`: every indexed item
/// * `top_level_items`: the items without tags (the tree root's items)
/// * `item_tree`: the tree root's children
pub fn site_context(indexed: &[&Item], tree: &TreeNode<&Item>) -> HashMap<String, Value> {
    let mut m: HashMap<String, Value> = HashMap::new();
    m.insert(
        "items".to_owned(),
        Value::Array(indexed.iter().map(|item| Value::from(*item)).collect()),
    );
    m.insert("top_level_items".to_owned(), items_value(&tree.items));
    m.insert(
        "item_tree".to_owned(),
        match tree_value(tree) {
            Value::Object(mut root) => root.remove("children").unwrap_or(Value::Nil),
            _ => Value::Nil,
        },
    );
    m
}

/// Converts a YAML value (e.g. a layout step's extra `context`) into a
/// template value. Mapping keys which aren't scalars are dropped.
pub fn from_yaml(value: &serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;
    match value {
        Yaml::Null => Value::Nil,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Value::from(i),
            (None, Some(u), _) => Value::from(u),
            (None, None, Some(f)) => Value::from(f),
            _ => Value::String(n.to_string()),
        },
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(seq) => Value::Array(seq.iter().map(from_yaml).collect()),
        Yaml::Mapping(mapping) => Value::Object(mapping_value(mapping)),
    }
}

/// Converts a YAML mapping into the fields of a template object.
pub fn mapping_value(mapping: &serde_yaml::Mapping) -> HashMap<String, Value> {
    use serde_yaml::Value as Yaml;
    mapping
        .iter()
        .filter_map(|(key, value)| {
            let key = match key {
                Yaml::String(s) => s.clone(),
                Yaml::Number(n) => n.to_string(),
                Yaml::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key, from_yaml(value)))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::item::Parser;
    use crate::tree::build_tree;
    use std::path::Path;

    fn item(location: &str, frontmatter: &str) -> Item {
        Parser::new(Path::new("/src"), ".fm")
            .parse_str(Path::new(location), &format!("---\n{}\n---\n", frontmatter))
            .unwrap()
    }

    fn field<'v>(value: &'v Value, name: &str) -> &'v Value {
        match value {
            Value::Object(m) => &m[name],
            _ => panic!("not an object: {:?}", value),
        }
    }

    fn string(value: &Value) -> &str {
        match value {
            Value::String(s) => s,
            _ => panic!("not a string: {:?}", value),
        }
    }

    fn array(value: &Value) -> &[Value] {
        match value {
            Value::Array(a) => a,
            _ => panic!("not an array: {:?}", value),
        }
    }

    #[test]
    fn test_item_value() {
        let value = Value::from(&item(
            "notes/sets.html.fm",
            "title: Sets\ntags: [school, math]\nabstract: About sets",
        ));
        assert_eq!("Sets", string(field(&value, "title")));
        assert_eq!("/notes/sets.html", string(field(&value, "href")));
        assert_eq!("About sets", string(field(&value, "abstract")));
        let tags: Vec<&str> = array(field(&value, "tags")).iter().map(string).collect();
        assert_eq!(vec!["math", "school"], tags);
    }

    #[test]
    fn test_site_context() {
        let items = vec![
            item("blue.fm", "title: Blue"),
            item("rose.fm", "title: Rose\ntags: [flower, nature]"),
            item("tree.fm", "title: Tree\ntags: [nature]"),
        ];
        let indexed: Vec<&Item> = items.iter().collect();
        let tree = build_tree(&indexed);
        let context = site_context(&indexed, &tree);

        assert_eq!(3, array(&context["items"]).len());

        let top: Vec<&str> = array(&context["top_level_items"])
            .iter()
            .map(|i| string(field(i, "title")))
            .collect();
        assert_eq!(vec!["Blue"], top);

        let item_tree = array(&context["item_tree"]);
        assert_eq!(1, item_tree.len());
        let nature = &item_tree[0];
        assert_eq!("nature", string(field(nature, "tag")));
        assert_eq!("nature", string(field(nature, "anchor")));

        let flower = &array(field(nature, "children"))[0];
        assert_eq!("flower", string(field(flower, "tag")));
        assert_eq!("nature-flower", string(field(flower, "anchor")));
        assert_eq!(
            "Rose",
            string(field(&array(field(flower, "items"))[0], "title"))
        );
    }

    #[test]
    fn test_from_yaml() {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str("name: x\nflags: [true, false]\nnested: {a: b}").unwrap();
        let value = from_yaml(&yaml);
        assert_eq!("x", string(field(&value, "name")));
        assert_eq!(2, array(field(&value, "flags")).len());
        assert_eq!("b", string(field(field(&value, "nested"), "a")));
    }
}
