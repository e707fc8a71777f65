//! SVG drawing surface.

use std::fmt::{self, Display, Formatter, Write};

use smallvec::SmallVec;

/// SVG namespace of the root element.
const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Handle to an element created on a [`Surface`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ElementId(usize);

/// Token returned by [`Surface::suspend_redraw`].
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub struct SuspendHandle(u32);

/// Vector primitives a clock face is built from.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ElementKind {
    Group,
    Circle,
    Line,
    Text,
    Style,
}

impl ElementKind {
    fn tag(&self) -> &'static str {
        match self {
            Self::Group => "g",
            Self::Circle => "circle",
            Self::Line => "line",
            Self::Text => "text",
            Self::Style => "style",
        }
    }
}

/// Drawing interface the clock face renders into.
pub trait Surface {
    /// Create a new element.
    ///
    /// Elements without a parent are appended to the surface's root.
    fn create(&mut self, parent: Option<ElementId>, kind: ElementKind) -> ElementId;

    /// Update an attribute on an element.
    ///
    /// Passing `None` as element will modify the surface's root.
    fn set_attribute(&mut self, element: Option<ElementId>, name: &'static str, value: String);

    /// Add a CSS class to an element.
    fn add_class(&mut self, element: Option<ElementId>, class: &str);

    /// Replace an element's text content.
    fn set_text(&mut self, element: ElementId, text: &str);

    /// Stop committing frames until the returned handle is released.
    ///
    /// Surfaces without redraw batching return `None`.
    fn suspend_redraw(&mut self) -> Option<SuspendHandle> {
        None
    }

    /// Release a handle from [`Surface::suspend_redraw`].
    fn unsuspend_redraw(&mut self, _handle: SuspendHandle) {}
}

/// Element in an [`SvgSurface`].
#[derive(Clone, Debug)]
struct Element {
    kind: ElementKind,
    attributes: Vec<(&'static str, String)>,
    classes: SmallVec<[String; 2]>,
    children: Vec<usize>,
    text: String,
}

impl Element {
    fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            attributes: Default::default(),
            classes: Default::default(),
            children: Default::default(),
            text: Default::default(),
        }
    }
}

/// In-memory SVG document.
///
/// Every modification commits a new frame, unless redraw is suspended, in
/// which case a single frame is committed once the last handle is released.
#[derive(Debug)]
pub struct SvgSurface {
    root: Element,
    elements: Vec<Element>,

    suspended: SmallVec<[SuspendHandle; 4]>,
    next_handle: u32,

    frames: u64,
    pending_frame: bool,
    dirty: bool,
}

impl Default for SvgSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl SvgSurface {
    pub fn new() -> Self {
        Self {
            root: Element::new(ElementKind::Group),
            frames: Default::default(),
            elements: Default::default(),
            suspended: Default::default(),
            next_handle: Default::default(),
            pending_frame: Default::default(),
            dirty: Default::default(),
        }
    }

    /// Number of frames committed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Check for a committed frame that was not consumed yet.
    ///
    /// This resets the pending frame status.
    pub fn take_frame(&mut self) -> bool {
        std::mem::take(&mut self.pending_frame)
    }

    /// Value of an element's attribute.
    #[cfg(test)]
    pub fn attribute(&self, element: Option<ElementId>, name: &str) -> Option<&str> {
        self.element(element)
            .attributes
            .iter()
            .find(|(attribute, _)| *attribute == name)
            .map(|(_, value)| value.as_str())
    }

    /// Number of elements with the specified class.
    #[cfg(test)]
    pub fn count_class(&self, class: &str) -> usize {
        self.elements.iter().filter(|element| element.classes.iter().any(|c| c == class)).count()
    }

    /// Serialize the surface as SVG document.
    pub fn to_svg(&self) -> String {
        self.to_string()
    }

    fn element(&self, element: Option<ElementId>) -> &Element {
        match element {
            Some(ElementId(index)) => &self.elements[index],
            None => &self.root,
        }
    }

    fn element_mut(&mut self, element: Option<ElementId>) -> &mut Element {
        match element {
            Some(ElementId(index)) => &mut self.elements[index],
            None => &mut self.root,
        }
    }

    /// Mark the document as modified.
    fn damage(&mut self) {
        self.dirty = true;

        if self.suspended.is_empty() {
            self.commit();
        }
    }

    /// Commit all pending modifications as one frame.
    fn commit(&mut self) {
        if !std::mem::take(&mut self.dirty) {
            return;
        }

        self.frames += 1;
        self.pending_frame = true;
    }

    fn write_element(&self, f: &mut Formatter<'_>, element: &Element, depth: usize) -> fmt::Result {
        let indent = depth * 2;
        write!(f, "{:indent$}<{}", "", element.kind.tag())?;

        if !element.classes.is_empty() {
            write!(f, " class=\"{}\"", Escaped(&element.classes.join(" ")))?;
        }
        for (name, value) in &element.attributes {
            write!(f, " {name}=\"{}\"", Escaped(value))?;
        }

        if element.children.is_empty() && element.text.is_empty() {
            return f.write_str("/>\n");
        }

        f.write_char('>')?;
        write!(f, "{}", Escaped(&element.text))?;

        if !element.children.is_empty() {
            f.write_char('\n')?;
            for child in &element.children {
                self.write_element(f, &self.elements[*child], depth + 1)?;
            }
            write!(f, "{:indent$}", "")?;
        }

        writeln!(f, "</{}>", element.kind.tag())
    }
}

impl Surface for SvgSurface {
    fn create(&mut self, parent: Option<ElementId>, kind: ElementKind) -> ElementId {
        let index = self.elements.len();
        self.elements.push(Element::new(kind));
        self.element_mut(parent).children.push(index);

        self.damage();

        ElementId(index)
    }

    fn set_attribute(&mut self, element: Option<ElementId>, name: &'static str, value: String) {
        let attributes = &mut self.element_mut(element).attributes;
        match attributes.iter_mut().find(|(attribute, _)| *attribute == name) {
            Some((_, old_value)) if *old_value == value => return,
            Some((_, old_value)) => *old_value = value,
            None => attributes.push((name, value)),
        }

        self.damage();
    }

    fn add_class(&mut self, element: Option<ElementId>, class: &str) {
        let classes = &mut self.element_mut(element).classes;
        if classes.iter().any(|c| c == class) {
            return;
        }
        classes.push(class.into());

        self.damage();
    }

    fn set_text(&mut self, element: ElementId, text: &str) {
        let element = self.element_mut(Some(element));
        if element.text == text {
            return;
        }
        element.text = text.into();

        self.damage();
    }

    fn suspend_redraw(&mut self) -> Option<SuspendHandle> {
        let handle = SuspendHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.suspended.push(handle);
        Some(handle)
    }

    fn unsuspend_redraw(&mut self, handle: SuspendHandle) {
        self.suspended.retain(|suspended| *suspended != handle);

        if self.suspended.is_empty() {
            self.commit();
        }
    }
}

impl Display for SvgSurface {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<svg xmlns=\"{SVG_NAMESPACE}\"")?;
        if !self.root.classes.is_empty() {
            write!(f, " class=\"{}\"", Escaped(&self.root.classes.join(" ")))?;
        }
        for (name, value) in &self.root.attributes {
            write!(f, " {name}=\"{}\"", Escaped(value))?;
        }
        f.write_str(">\n")?;

        for child in &self.root.children {
            self.write_element(f, &self.elements[*child], 1)?;
        }

        f.write_str("</svg>\n")
    }
}

/// XML-escaped text.
struct Escaped<'a>(&'a str);

impl Display for Escaped<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '&' => f.write_str("&amp;")?,
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '"' => f.write_str("&quot;")?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_commit_frames() {
        let mut surface = SvgSurface::new();
        let line = surface.create(None, ElementKind::Line);
        surface.set_attribute(Some(line), "x1", "1".into());
        assert_eq!(surface.frames(), 2);

        // Unchanged values don't cause damage.
        surface.set_attribute(Some(line), "x1", "1".into());
        assert_eq!(surface.frames(), 2);
        assert!(surface.take_frame());
        assert!(!surface.take_frame());
    }

    #[test]
    fn nested_suspension_commits_once() {
        let mut surface = SvgSurface::new();
        let line = surface.create(None, ElementKind::Line);
        let frames = surface.frames();

        let outer = surface.suspend_redraw().unwrap();
        let inner = surface.suspend_redraw().unwrap();
        surface.set_attribute(Some(line), "x1", "1".into());
        surface.set_attribute(Some(line), "y1", "2".into());
        surface.unsuspend_redraw(inner);
        assert_eq!(surface.frames(), frames);

        surface.set_attribute(Some(line), "x1", "3".into());
        surface.unsuspend_redraw(outer);
        assert_eq!(surface.frames(), frames + 1);
    }

    #[test]
    fn clean_resume_skips_frame() {
        let mut surface = SvgSurface::new();
        surface.create(None, ElementKind::Group);
        let frames = surface.frames();

        let handle = surface.suspend_redraw().unwrap();
        surface.unsuspend_redraw(handle);
        assert_eq!(surface.frames(), frames);
    }

    #[test]
    fn serialize_document() {
        let mut surface = SvgSurface::new();
        surface.add_class(None, "clock");
        surface.set_attribute(None, "width", "100".into());
        let group = surface.create(None, ElementKind::Group);
        surface.add_class(Some(group), "letter");
        let text = surface.create(Some(group), ElementKind::Text);
        surface.set_text(text, "<A>");

        let svg = surface.to_svg();
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\" class=\"clock\""));
        assert!(svg.contains("width=\"100\""));
        assert!(svg.contains("<g class=\"letter\">\n    <text>&lt;A&gt;</text>\n  </g>\n"));
        assert!(svg.ends_with("</svg>\n"));
        assert_eq!(surface.count_class("letter"), 1);
    }
}
