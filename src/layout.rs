//! Window layout descriptors.
//!
//! Tmux describes the pane geometry of a window with a compact string:
//!
//! ```text
//! layout   := checksum ',' node
//! node     := geometry [ '[' children ']' | '{' children '}' ]
//! children := node (',' node)*
//! geometry := W 'x' H ',' X ',' Y [',' paneId]
//! ```
//!
//! `[...]` is a [`Split::Row`] (children stacked top to bottom, sharing the
//! width) and `{...}` is a [`Split::Column`] (children side by side, sharing
//! the height). Parsing is purely functional; only [`Layout::render`] and
//! [`Layout::commands`] talk to the multiplexer.
//!
//! ```
//! use muxctx::layout::Layout;
//!
//! let layout = Layout::parse("d67e,80x24,0,0{40x24,0,0,0,39x24,41,0[39x12,41,0,1,39x11,41,13,2]}").unwrap();
//! assert_eq!(layout.leaves(), vec![0, 1, 2]);
//! assert!(layout.verify());
//! ```

use crate::ansi;
use crate::error::{MuxctxError, Result};
use crate::tmux::Multiplexer;
use std::fmt;

/// Position and size of a node, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

/// Direction of an interior node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    /// `[...]`: children stacked vertically.
    Row,
    /// `{...}`: children side by side.
    Column,
}

impl Split {
    fn delimiters(self) -> (char, char) {
        match self {
            Split::Row => ('[', ']'),
            Split::Column => ('{', '}'),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Pane(u32),
    Split { split: Split, children: Vec<LayoutNode> },
}

/// A node of the layout tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub geometry: Geometry,
    /// Geometry as parsed; resizes always scale from here.
    original: Geometry,
    pub kind: NodeKind,
}

impl LayoutNode {
    pub fn pane(&self) -> Option<u32> {
        match self.kind {
            NodeKind::Pane(id) => Some(id),
            NodeKind::Split { .. } => None,
        }
    }

    pub fn children(&self) -> &[LayoutNode] {
        match &self.kind {
            NodeKind::Pane(_) => &[],
            NodeKind::Split { children, .. } => children,
        }
    }

    fn find(&self, id: u32) -> Option<&LayoutNode> {
        match &self.kind {
            NodeKind::Pane(pane) if *pane == id => Some(self),
            NodeKind::Pane(_) => None,
            NodeKind::Split { children, .. } => children.iter().find_map(|c| c.find(id)),
        }
    }

    fn collect_leaves(&self, out: &mut Vec<u32>) {
        match &self.kind {
            NodeKind::Pane(id) => out.push(*id),
            NodeKind::Split { children, .. } => {
                children.iter().for_each(|c| c.collect_leaves(out));
            }
        }
    }

    fn scale(&mut self, fx: f64, fy: f64) {
        let o = self.original;
        let scale = |v: u32, f: f64| (f64::from(v) * f).round() as u32;
        self.geometry = Geometry {
            width: scale(o.width, fx),
            height: scale(o.height, fy),
            x: scale(o.x, fx),
            y: scale(o.y, fy),
        };
        if let NodeKind::Split { children, .. } = &mut self.kind {
            children.iter_mut().for_each(|c| c.scale(fx, fy));
        }
    }
}

impl fmt::Display for LayoutNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.geometry;
        write!(f, "{}x{},{},{}", g.width, g.height, g.x, g.y)?;
        match &self.kind {
            NodeKind::Pane(id) => write!(f, ",{id}"),
            NodeKind::Split { split, children } => {
                let (open, close) = split.delimiters();
                write!(f, "{open}")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, "{close}")
            }
        }
    }
}

/// A parsed window layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    checksum: String,
    root: LayoutNode,
}

impl Layout {
    /// Parse a layout descriptor.
    ///
    /// # Errors
    ///
    /// [`MuxctxError::Malformed`] on any grammar violation, including trailing
    /// characters, leaves without a pane id and splits with fewer than two
    /// children. No partial tree is returned.
    pub fn parse(s: &str) -> Result<Self> {
        let (checksum, body) = s
            .split_once(',')
            .ok_or_else(|| malformed(s, 0, "missing checksum"))?;
        if checksum.is_empty() {
            return Err(malformed(s, 0, "empty checksum"));
        }
        let mut parser = Parser {
            src: s,
            bytes: body.as_bytes(),
            pos: 0,
            offset: checksum.len() + 1,
        };
        let root = parser.node()?;
        if parser.pos != parser.bytes.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(Layout {
            checksum: checksum.to_string(),
            root,
        })
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn root(&self) -> &LayoutNode {
        &self.root
    }

    /// Whether the preserved checksum matches the serialized body.
    pub fn verify(&self) -> bool {
        u16::from_str_radix(&self.checksum, 16) == Ok(checksum(&self.root.to_string()))
    }

    /// Serialize with a freshly computed checksum, as `select-layout` expects
    /// after the geometry changed.
    pub fn to_tmux_string(&self) -> String {
        let body = self.root.to_string();
        format!("{:04x},{body}", checksum(&body))
    }

    /// Scale every node to a window of `width` x `height`.
    ///
    /// Visual only: nothing is sent to the multiplexer. Scaling always starts
    /// from the parsed geometry so repeated resizes do not accumulate error.
    pub fn resize(&mut self, width: u32, height: u32) {
        let o = self.root.original;
        if o.width == 0 || o.height == 0 {
            return;
        }
        let fx = f64::from(width) / f64::from(o.width);
        let fy = f64::from(height) / f64::from(o.height);
        self.root.scale(fx, fy);
    }

    /// Find the leaf holding pane `id`.
    pub fn find_pane(&self, id: u32) -> Result<&LayoutNode> {
        self.root
            .find(id)
            .ok_or_else(|| MuxctxError::NotFound(format!("pane %{id} in layout")))
    }

    /// Pane ids in leaf order.
    pub fn leaves(&self) -> Vec<u32> {
        let mut out = Vec::new();
        self.root.collect_leaves(&mut out);
        out
    }

    /// Current command of every pane, in leaf order.
    pub fn commands(&self, mux: &dyn Multiplexer) -> Result<Vec<String>> {
        self.leaves()
            .into_iter()
            .map(|id| mux.pane_current_command(id))
            .collect()
    }

    /// Compose a preview: each pane's captured buffer fitted to its cell,
    /// joined with single-line borders at split boundaries.
    pub fn render(&self, mux: &dyn Multiplexer, border_color: Option<&str>) -> Result<String> {
        let g = self.root.geometry;
        let border = Border::new(border_color);
        let lines = render_node(&self.root, g.width as usize, g.height as usize, mux, &border)?;
        Ok(lines.join("\n"))
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.checksum, self.root)
    }
}

/// Tmux's 16-bit rotating layout checksum.
pub fn checksum(body: &str) -> u16 {
    body.bytes().fold(0u16, |csum, b| {
        let rotated = (csum >> 1) | ((csum & 1) << 15);
        rotated.wrapping_add(u16::from(b))
    })
}

fn malformed(src: &str, at: usize, what: &str) -> MuxctxError {
    MuxctxError::Malformed(format!("layout {src:?} at {at}: {what}"))
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Offset of `bytes` within `src`, for error positions.
    offset: usize,
}

impl Parser<'_> {
    fn error(&self, what: &str) -> MuxctxError {
        malformed(self.src, self.offset + self.pos, what)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}", b as char)))
        }
    }

    fn number(&mut self) -> Result<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected number"));
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("number out of range"))
    }

    /// After `,`: digits not followed by `x` are a pane id rather than the
    /// geometry of a sibling.
    fn at_pane_id(&self) -> bool {
        let digits = self.bytes[self.pos + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        digits > 0 && self.bytes.get(self.pos + 1 + digits) != Some(&b'x')
    }

    fn node(&mut self) -> Result<LayoutNode> {
        let width = self.number()?;
        self.expect(b'x')?;
        let height = self.number()?;
        self.expect(b',')?;
        let x = self.number()?;
        self.expect(b',')?;
        let y = self.number()?;
        let geometry = Geometry {
            width,
            height,
            x,
            y,
        };

        let kind = match self.peek() {
            Some(b'[') => self.children(Split::Row)?,
            Some(b'{') => self.children(Split::Column)?,
            Some(b',') if self.at_pane_id() => {
                self.pos += 1;
                NodeKind::Pane(self.number()?)
            }
            _ => return Err(self.error("leaf without pane id")),
        };
        Ok(LayoutNode {
            geometry,
            original: geometry,
            kind,
        })
    }

    fn children(&mut self, split: Split) -> Result<NodeKind> {
        let (_, close) = split.delimiters();
        self.pos += 1;
        let mut children = vec![self.node()?];
        loop {
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    children.push(self.node()?);
                }
                Some(b) if b == close as u8 => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error(&format!("expected ',' or {close:?}"))),
            }
        }
        if children.len() < 2 {
            return Err(self.error("split with a single child"));
        }
        Ok(NodeKind::Split { split, children })
    }
}

struct Border {
    start: String,
    end: &'static str,
}

impl Border {
    fn new(color: Option<&str>) -> Self {
        let start = color.map(ansi::fg).unwrap_or_default();
        let end = if start.is_empty() { "" } else { "\x1b[0m" };
        Border { start, end }
    }

    fn paint(&self, s: &str) -> String {
        format!("{}{s}{}", self.start, self.end)
    }
}

/// Split `total` proportionally to `weights`; the last share absorbs rounding.
fn distribute(total: usize, weights: &[u32]) -> Vec<usize> {
    let sum: u64 = weights.iter().map(|&w| u64::from(w)).sum();
    let n = weights.len();
    let mut shares: Vec<usize> = if sum == 0 {
        vec![total / n.max(1); n]
    } else {
        weights
            .iter()
            .map(|&w| (total as u64 * u64::from(w) / sum) as usize)
            .collect()
    };
    let used: usize = shares.iter().sum();
    if let Some(last) = shares.last_mut() {
        *last += total.saturating_sub(used);
    }
    shares
}

fn render_node(
    node: &LayoutNode,
    width: usize,
    height: usize,
    mux: &dyn Multiplexer,
    border: &Border,
) -> Result<Vec<String>> {
    match &node.kind {
        NodeKind::Pane(id) => {
            let captured = mux.capture_pane(*id, width as u32)?;
            let mut lines: Vec<String> = captured
                .lines()
                .take(height)
                .map(|l| ansi::fit(l, width))
                .collect();
            lines.resize(height, " ".repeat(width));
            Ok(lines)
        }
        NodeKind::Split { split, children } => {
            let gaps = children.len() - 1;
            match split {
                Split::Column => {
                    let weights: Vec<u32> = children.iter().map(|c| c.geometry.width).collect();
                    let widths = distribute(width.saturating_sub(gaps), &weights);
                    let rendered = children
                        .iter()
                        .zip(&widths)
                        .map(|(c, &w)| render_node(c, w, height, mux, border))
                        .collect::<Result<Vec<_>>>()?;
                    let bar = border.paint("│");
                    Ok((0..height)
                        .map(|row| {
                            rendered
                                .iter()
                                .map(|lines| lines[row].as_str())
                                .collect::<Vec<_>>()
                                .join(&bar)
                        })
                        .collect())
                }
                Split::Row => {
                    let weights: Vec<u32> = children.iter().map(|c| c.geometry.height).collect();
                    let heights = distribute(height.saturating_sub(gaps), &weights);
                    let rule = border.paint(&"─".repeat(width));
                    let mut out = Vec::with_capacity(height);
                    for (i, (c, &h)) in children.iter().zip(&heights).enumerate() {
                        if i > 0 {
                            out.push(rule.clone());
                        }
                        out.extend(render_node(c, width, h, mux, border)?);
                    }
                    Ok(out)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMux;

    const TMUX_LAYOUT: &str = "d67e,80x24,0,0{40x24,0,0,0,39x24,41,0[39x12,41,0,1,39x11,41,13,2]}";

    fn sum_invariant(node: &LayoutNode) -> bool {
        match &node.kind {
            NodeKind::Pane(_) => true,
            NodeKind::Split { split, children } => {
                let ok = match split {
                    Split::Column => {
                        children.iter().map(|c| c.geometry.width).sum::<u32>() == node.geometry.width
                    }
                    Split::Row => {
                        children.iter().map(|c| c.geometry.height).sum::<u32>()
                            == node.geometry.height
                    }
                };
                ok && children.iter().all(sum_invariant)
            }
        }
    }

    #[test]
    fn test_parse_nested_layout() {
        let layout =
            Layout::parse("abcd1234,80x24,0,0{40x24,0,0,1,40x24,40,0[20x24,40,0,2,20x24,60,0,3]}")
                .unwrap();
        let root = layout.root();
        assert_eq!(layout.checksum(), "abcd1234");
        assert!(matches!(root.kind, NodeKind::Split { split: Split::Column, .. }));
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.children()[0].pane(), Some(1));

        let row = &root.children()[1];
        assert!(matches!(row.kind, NodeKind::Split { split: Split::Row, .. }));
        assert_eq!(
            row.geometry,
            Geometry {
                width: 40,
                height: 24,
                x: 40,
                y: 0
            }
        );
        let panes: Vec<_> = row.children().iter().map(|c| c.pane()).collect();
        assert_eq!(panes, vec![Some(2), Some(3)]);
        assert_eq!(row.children()[1].geometry.x, 60);
    }

    #[test]
    fn test_round_trip_is_byte_exact() {
        for s in [
            TMUX_LAYOUT,
            "b260,80x24,0,0,3",
            "abcd1234,80x24,0,0{40x24,0,0,1,40x24,40,0[20x24,40,0,2,20x24,60,0,3]}",
        ] {
            assert_eq!(Layout::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_checksum_matches_tmux() {
        assert_eq!(checksum("80x24,0,0,3"), 0xb260);
        assert!(Layout::parse(TMUX_LAYOUT).unwrap().verify());
        assert!(!Layout::parse("0000,80x24,0,0,3").unwrap().verify());
    }

    #[test]
    fn test_children_fill_parent() {
        let layout =
            Layout::parse("ffff,80x24,0,0{40x24,0,0,1,40x24,40,0[40x12,40,0,2,40x12,40,12,3]}")
                .unwrap();
        assert!(sum_invariant(layout.root()));
    }

    #[test]
    fn test_malformed_inputs() {
        for s in [
            "",
            "abcd",
            ",80x24,0,0,1",
            "abcd,80x24,0,0",
            "abcd,80x24,0,0,1,",
            "abcd,80x24,0,0,1junk",
            "abcd,80x24,0,0{40x24,0,0,1}",
            "abcd,80x24,0,0{40x24,0,0,1,40x24,40,0,2",
            "abcd,80x24,0,0{40x24,0,0,1,40x24,40,0,2]",
            "abcd,80y24,0,0,1",
            "abcd,99999999999x24,0,0,1",
        ] {
            assert!(
                matches!(Layout::parse(s), Err(MuxctxError::Malformed(_))),
                "{s:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_find_pane_and_leaves() {
        let layout = Layout::parse(TMUX_LAYOUT).unwrap();
        assert_eq!(layout.leaves(), vec![0, 1, 2]);
        assert_eq!(layout.find_pane(2).unwrap().geometry.y, 13);
        assert!(matches!(layout.find_pane(9), Err(MuxctxError::NotFound(_))));
    }

    #[test]
    fn test_resize_scales_from_original() {
        let mut layout = Layout::parse(TMUX_LAYOUT).unwrap();
        layout.resize(40, 12);
        let right = &layout.root().children()[1];
        assert_eq!(right.geometry.x, 21);
        assert_eq!(right.geometry.height, 12);

        // Odd sizes then back to the original: no drift.
        layout.resize(33, 7);
        layout.resize(80, 24);
        assert_eq!(layout.to_string(), TMUX_LAYOUT);
    }

    #[test]
    fn test_to_tmux_string_recomputes_checksum() {
        let mut layout = Layout::parse(TMUX_LAYOUT).unwrap();
        layout.resize(160, 48);
        let fresh = Layout::parse(&layout.to_tmux_string()).unwrap();
        assert!(fresh.verify());
    }

    #[test]
    fn test_render_joins_with_borders() {
        let mux = FakeMux::new();
        mux.set_capture(0, "left");
        mux.set_capture(1, "top");
        mux.set_capture(2, "bottom\nmore");
        let layout = Layout::parse("0000,9x3,0,0{4x3,0,0,0,4x3,5,0[4x1,5,0,1,4x1,5,2,2]}").unwrap();
        let out = layout.render(&mux, None).unwrap();
        assert_eq!(out, "left│top \n    │────\n    │bott");
    }

    #[test]
    fn test_render_colours_borders() {
        let mux = FakeMux::new();
        let layout = Layout::parse("0000,3x1,0,0{1x1,0,0,0,1x1,2,0,1}").unwrap();
        let out = layout.render(&mux, Some("red")).unwrap();
        assert_eq!(out, " \x1b[31m│\x1b[0m ");
    }

    #[test]
    fn test_commands_in_leaf_order() {
        let mux = FakeMux::new();
        mux.set_command(0, "nvim");
        mux.set_command(1, "zsh");
        mux.set_command(2, "k9s");
        let layout = Layout::parse(TMUX_LAYOUT).unwrap();
        assert_eq!(layout.commands(&mux).unwrap(), vec!["nvim", "zsh", "k9s"]);
    }
}
