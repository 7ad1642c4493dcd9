use iced::widget::{button, row, text, Column, Space};
use iced::{Element, Length, Theme};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::Message;

const INDENT: f32 = 12.0;

/// One line of the folder tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRow {
    pub path: PathBuf,
    pub label: String,
    pub depth: usize,
}

/// Flatten indexed folders into a tree rooted at their common ancestor.
///
/// Intermediate directories get a row too, so two folders with the same
/// name sit under different parents. Rows come out in depth-first order.
pub fn folder_rows(folders: &[PathBuf]) -> Vec<FolderRow> {
    let Some(root) = common_ancestor(folders) else {
        return Vec::new();
    };
    let root_depth = root.components().count();

    let mut nodes = BTreeSet::new();
    for folder in folders {
        for ancestor in folder.ancestors() {
            if !ancestor.starts_with(&root) {
                break;
            }
            nodes.insert(ancestor.to_path_buf());
        }
    }

    nodes
        .into_iter()
        .map(|path| {
            let depth = path.components().count() - root_depth;
            let label = match path.file_name() {
                Some(name) if depth > 0 => name.to_string_lossy().to_string(),
                _ => path.display().to_string(),
            };
            FolderRow { path, label, depth }
        })
        .collect()
}

fn common_ancestor(folders: &[PathBuf]) -> Option<PathBuf> {
    let (first, rest) = folders.split_first()?;
    let mut common: PathBuf = first.clone();
    for folder in rest {
        common = common
            .components()
            .zip(folder.components())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a)
            .collect();
    }
    Some(common)
}

/// "All media" plus the folder tree. Each folder has a remove button,
/// disabled while a scan is running.
pub fn view<'a>(
    rows: &'a [FolderRow],
    selected: Option<&Path>,
    scanning: bool,
) -> Element<'a, Message> {
    let mut sidebar = Column::new().spacing(4).padding(10).push(
        button(text("All media").size(14))
            .width(Length::Fill)
            .style(style_for(selected.is_none()))
            .on_press(Message::FolderSelected(None)),
    );

    for folder in rows {
        let is_selected = selected == Some(folder.path.as_path());
        let entry = button(text(folder.label.as_str()).size(14))
            .width(Length::Fill)
            .style(style_for(is_selected))
            .on_press(Message::FolderSelected(Some(folder.path.clone())));
        let remove = button(text("✕").size(12))
            .style(button::text)
            .on_press_maybe((!scanning).then(|| Message::RemoveFolder(folder.path.clone())));

        sidebar = sidebar.push(row![
            Space::with_width(Length::Fixed(folder.depth as f32 * INDENT)),
            entry,
            remove,
        ]);
    }

    sidebar.into()
}

fn style_for(selected: bool) -> fn(&Theme, button::Status) -> button::Style {
    if selected {
        button::primary
    } else {
        button::text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(folders: &[&str]) -> Vec<(String, usize)> {
        let folders: Vec<PathBuf> = folders.iter().map(PathBuf::from).collect();
        folder_rows(&folders)
            .into_iter()
            .map(|row| (row.label, row.depth))
            .collect()
    }

    #[test]
    fn test_tree_under_common_ancestor() {
        assert_eq!(
            rows(&["/m/photos/2023", "/m/photos/2024", "/m/videos"]),
            vec![
                ("/m".to_string(), 0),
                ("photos".to_string(), 1),
                ("2023".to_string(), 2),
                ("2024".to_string(), 2),
                ("videos".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_same_name_folders_have_distinct_parents() {
        let folders = vec![PathBuf::from("/a/trip"), PathBuf::from("/b/trip")];
        let tree = folder_rows(&folders);
        let trips: Vec<_> = tree.iter().filter(|row| row.label == "trip").collect();
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].path, PathBuf::from("/a/trip"));
        assert_eq!(trips[1].path, PathBuf::from("/b/trip"));
        // Each sits right under its own parent row
        let a = tree.iter().position(|row| row.path == Path::new("/a")).unwrap();
        assert_eq!(tree[a + 1].path, PathBuf::from("/a/trip"));
    }

    #[test]
    fn test_single_folder_and_empty() {
        assert_eq!(rows(&["/m/photos"]), vec![("/m/photos".to_string(), 0)]);
        assert!(rows(&[]).is_empty());
    }
}
