//! status text the room sends to every singer, split into pages
//!
//! One datagram carries [`STATUS_LINES_PER_PAGE`] lines.  Every time the server builds a
//! new picture of the room it bumps the generation so a singer can tell a stale page
//! from a fresh one and throw the stale ones away.
use super::{
    choir_packet::{ServerPacket, STATUS_LINES_PER_PAGE, STATUS_WIDTH},
    seq_diff,
};

const MAX_PAGES: usize = u8::MAX as usize;
const OWN_LINE_MARK: char = '*';

struct StatusLine {
    owner: Option<u8>,
    text: String,
}

/// Collects the lines of one status picture and hands out the pages for each recipient
pub struct StatusPager {
    generation: u32,
    lines: Vec<StatusLine>,
}

impl StatusPager {
    pub fn new() -> StatusPager {
        StatusPager {
            generation: 0,
            lines: vec![],
        }
    }
    /// start a new picture
    pub fn begin(&mut self) -> () {
        self.generation = self.generation.wrapping_add(1);
        self.lines.clear();
    }
    /// add a line, `owner` is the client the line describes (if any)
    pub fn add_line(&mut self, owner: Option<u8>, text: &str) -> () {
        if self.lines.len() >= MAX_PAGES * STATUS_LINES_PER_PAGE {
            return;
        }
        // leave column 0 for the mark
        let text: String = format!(" {}", text).chars().take(STATUS_WIDTH).collect();
        self.lines.push(StatusLine { owner, text });
    }
    pub fn get_generation(&self) -> u32 {
        self.generation
    }
    pub fn page_count(&self) -> usize {
        (self.lines.len() + STATUS_LINES_PER_PAGE - 1) / STATUS_LINES_PER_PAGE
    }
    /// the pages for one recipient, with their own line marked
    pub fn pages_for(&self, client_id: u8) -> Vec<ServerPacket> {
        let count = self.page_count();
        self.lines
            .chunks(STATUS_LINES_PER_PAGE)
            .enumerate()
            .map(|(idx, chunk)| {
                let mut text = String::new();
                for line in chunk {
                    if line.owner == Some(client_id) {
                        text.push(OWN_LINE_MARK);
                        text.extend(line.text.chars().skip(1));
                    } else {
                        text.push_str(&line.text);
                    }
                    text.push('\n');
                }
                ServerPacket::StatusText {
                    page_index: idx as u8,
                    page_count: count as u8,
                    generation: self.generation,
                    text,
                }
            })
            .collect()
    }
}

/// Puts the pages back together on the singer's side
pub struct StatusAssembler {
    generation: Option<u32>,
    pages: Vec<Option<String>>,
    delivered: bool,
}

impl StatusAssembler {
    pub fn new() -> StatusAssembler {
        StatusAssembler {
            generation: None,
            pages: vec![],
            delivered: false,
        }
    }
    fn reset(&mut self, generation: u32, page_count: usize) -> () {
        self.generation = Some(generation);
        self.pages = vec![None; page_count];
        self.delivered = false;
    }
    /// Add a page.  Returns the whole text the first time every page of a generation
    /// has arrived.
    pub fn add_page(
        &mut self,
        page_index: u8,
        page_count: u8,
        generation: u32,
        text: &str,
    ) -> Option<String> {
        match self.generation {
            Some(current) if seq_diff(generation, current) < 0 => return None,
            Some(current) if generation == current && self.pages.len() == page_count as usize => {}
            _ => self.reset(generation, page_count as usize),
        }
        let idx = page_index as usize;
        if idx >= self.pages.len() {
            return None;
        }
        self.pages[idx] = Some(text.to_string());
        if self.delivered || self.pages.iter().any(|p| p.is_none()) {
            return None;
        }
        self.delivered = true;
        Some(self.pages.iter().flatten().map(|p| p.as_str()).collect())
    }
}

#[cfg(test)]
mod test_status_page {
    use super::*;

    fn page_text(pkt: &ServerPacket) -> (u8, u8, u32, String) {
        match pkt {
            ServerPacket::StatusText {
                page_index,
                page_count,
                generation,
                text,
            } => (*page_index, *page_count, *generation, text.clone()),
            _ => panic!("not a status page"),
        }
    }

    #[test]
    fn marks_own_line() {
        let mut pager = StatusPager::new();
        pager.begin();
        pager.add_line(None, "room header");
        for id in 0..6u8 {
            pager.add_line(Some(id), &format!("singer {}", id));
        }
        assert_eq!(pager.page_count(), 2);
        let pages = pager.pages_for(2);
        assert_eq!(pages.len(), 2);
        let (idx, count, generation, text) = page_text(&pages[0]);
        assert_eq!((idx, count, generation), (0, 2, 1));
        assert_eq!(text, " room header\n singer 0\n singer 1\n*singer 2\n");
        let (_, _, _, text) = page_text(&pages[1]);
        assert_eq!(text, " singer 3\n singer 4\n singer 5\n");
    }
    #[test]
    fn lines_are_truncated() {
        let mut pager = StatusPager::new();
        pager.begin();
        pager.add_line(None, &"x".repeat(200));
        let (_, _, _, text) = page_text(&pager.pages_for(0)[0]);
        assert_eq!(text.len(), STATUS_WIDTH + 1);
    }
    #[test]
    fn reassembles_out_of_order() {
        let mut asm = StatusAssembler::new();
        assert_eq!(asm.add_page(1, 2, 5, "b\n"), None);
        assert_eq!(asm.add_page(0, 2, 5, "a\n"), Some("a\nb\n".to_string()));
        // a repeat of the same generation is not delivered twice
        assert_eq!(asm.add_page(0, 2, 5, "a\n"), None);
    }
    #[test]
    fn stale_generation_is_discarded() {
        let mut asm = StatusAssembler::new();
        assert_eq!(asm.add_page(0, 2, 7, "new a\n"), None);
        assert_eq!(asm.add_page(1, 2, 6, "old b\n"), None);
        assert_eq!(asm.add_page(1, 2, 7, "new b\n"), Some("new a\nnew b\n".to_string()));
    }
    #[test]
    fn newer_generation_resets() {
        let mut asm = StatusAssembler::new();
        assert_eq!(asm.add_page(0, 2, 1, "old a\n"), None);
        assert_eq!(asm.add_page(0, 1, 2, "only\n"), Some("only\n".to_string()));
    }
}
