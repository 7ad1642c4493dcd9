use iced::widget::{container, image, mouse_area, stack, text, tooltip, Column, Row, Space};
use iced::{Element, Length};
use std::collections::HashMap;

use super::viewport::{GridGeometry, CELL_HEIGHT, CELL_WIDTH, PADDING, SPACING};
use crate::state::data::{MediaEntry, MediaKind};
use crate::state::stats::format_size;
use crate::thumbnail::Thumbnail;
use crate::Message;

/// Side of the square the thumbnail is drawn in
const THUMB_BOX: f32 = 100.0;

/// What a cell currently shows in place of its thumbnail
#[derive(Debug, Clone)]
pub enum Decoration {
    /// Requested, waiting for the pipeline
    Loading,
    Thumbnail(image::Handle),
    /// Generation failed; show a generic file-type tile
    Fallback,
}

impl Decoration {
    pub fn from_result(result: Option<Thumbnail>) -> Self {
        match result {
            Some(thumbnail) => {
                let (width, height) = thumbnail.dimensions();
                let rgba = ::image::DynamicImage::ImageRgb8(thumbnail).into_rgba8();
                Decoration::Thumbnail(image::Handle::from_rgba(width, height, rgba.into_raw()))
            }
            None => Decoration::Fallback,
        }
    }
}

/// Only the lines near the viewport get widgets; the rest of the content
/// height is filled with spacers so the scrollbar stays accurate.
pub fn view<'a>(
    entries: &'a [MediaEntry],
    decorations: &'a HashMap<usize, Decoration>,
    geometry: &GridGeometry,
) -> Element<'a, Message> {
    let columns = geometry.columns();
    let pitch = GridGeometry::line_pitch();
    let lines = geometry.visible_lines();
    let total_lines = geometry.lines();

    let mut grid = Column::new().push(Space::with_height(Length::Fixed(
        lines.start as f32 * pitch,
    )));

    for line in lines.clone() {
        let start = (line * columns).min(entries.len());
        let end = (start + columns).min(entries.len());
        let cells = entries[start..end]
            .iter()
            .enumerate()
            .map(|(offset, entry)| cell(entry, decorations.get(&(start + offset))));

        grid = grid.push(
            Row::with_children(cells)
                .spacing(SPACING)
                .height(Length::Fixed(pitch)),
        );
    }

    grid = grid.push(Space::with_height(Length::Fixed(
        total_lines.saturating_sub(lines.end) as f32 * pitch,
    )));

    container(grid).padding(PADDING).width(Length::Fill).into()
}

fn cell<'a>(entry: &'a MediaEntry, decoration: Option<&Decoration>) -> Element<'a, Message> {
    let preview: Element<'a, Message> = match decoration {
        Some(Decoration::Thumbnail(handle)) => image(handle.clone())
            .width(Length::Fixed(THUMB_BOX))
            .height(Length::Fixed(THUMB_BOX))
            .into(),
        Some(Decoration::Fallback) => tile(entry.type_label()),
        Some(Decoration::Loading) | None => tile("…".to_string()),
    };

    let preview: Element<'a, Message> = if entry.kind == MediaKind::Video {
        stack![
            preview,
            container(text("▶").size(16))
                .padding(4)
                .align_right(Length::Fixed(THUMB_BOX))
                .align_bottom(Length::Fixed(THUMB_BOX)),
        ]
        .into()
    } else {
        preview
    };

    let content = Column::new()
        .push(container(preview).center_x(Length::Fixed(CELL_WIDTH)))
        .push(
            container(text(entry.filename.as_str()).size(12))
                .center_x(Length::Fixed(CELL_WIDTH))
                .height(Length::Fill),
        )
        .spacing(5);

    let cell = container(content)
        .width(Length::Fixed(CELL_WIDTH))
        .height(Length::Fixed(CELL_HEIGHT))
        .padding([PADDING, 0.0]);

    tooltip(
        mouse_area(cell).on_press(Message::OpenMedia(entry.path.clone())),
        container(text(details(entry)).size(12))
            .padding(6)
            .style(container::rounded_box),
        tooltip::Position::Bottom,
    )
    .into()
}

/// Tooltip text: file name, modification date and size
fn details(entry: &MediaEntry) -> String {
    format!(
        "{}\n{} · {}",
        entry.filename,
        entry.modified.format("%Y-%m-%d %H:%M"),
        format_size(entry.size)
    )
}

fn tile<'a>(label: String) -> Element<'a, Message> {
    container(text(label).size(20))
        .center_x(Length::Fixed(THUMB_BOX))
        .center_y(Length::Fixed(THUMB_BOX))
        .style(container::rounded_box)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{Rgb, RgbImage};

    #[test]
    fn test_details_show_date_and_size() {
        let entry = MediaEntry {
            path: "/p/a.jpg".into(),
            filename: "a.jpg".to_string(),
            extension: ".jpg".to_string(),
            kind: MediaKind::Image,
            modified: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            size: 2048,
        };
        assert_eq!(details(&entry), "a.jpg\n2023-11-14 22:13 · 2 KB");
    }

    #[test]
    fn test_decoration_from_result() {
        let thumb = RgbImage::from_pixel(100, 75, Rgb([1, 2, 3]));
        assert!(matches!(
            Decoration::from_result(Some(thumb)),
            Decoration::Thumbnail(_)
        ));
        assert!(matches!(Decoration::from_result(None), Decoration::Fallback));
    }
}
