use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub line: u32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointSet {
    by_line: BTreeMap<u32, bool>,
}

impl BreakpointSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, line: u32) {
        if line == 0 {
            return;
        }
        self.by_line.entry(line).or_insert(true);
    }

    pub fn remove(&mut self, line: u32) {
        self.by_line.remove(&line);
    }

    /// Gutter click: adds the breakpoint when absent, removes it otherwise.
    /// Returns whether the line holds a breakpoint afterwards.
    pub fn toggle(&mut self, line: u32) -> bool {
        if self.by_line.remove(&line).is_some() {
            return false;
        }
        self.add(line);
        self.contains(line)
    }

    pub fn toggle_enabled(&mut self, line: u32) {
        if let Some(enabled) = self.by_line.get_mut(&line) {
            *enabled = !*enabled;
        }
    }

    pub fn clear(&mut self) {
        self.by_line.clear();
    }

    #[must_use]
    pub fn list(&self) -> Vec<u32> {
        self.by_line.keys().copied().collect()
    }

    #[must_use]
    pub fn enabled_lines(&self) -> Vec<u32> {
        self.by_line
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(line, _)| *line)
            .collect()
    }

    #[must_use]
    pub fn get(&self, line: u32) -> Option<Breakpoint> {
        self.by_line
            .get(&line)
            .map(|enabled| Breakpoint {
                line,
                enabled: *enabled,
            })
    }

    #[must_use]
    pub fn contains(&self, line: u32) -> bool {
        self.by_line.contains_key(&line)
    }

    #[must_use]
    pub fn is_enabled(&self, line: u32) -> bool {
        self.by_line.get(&line).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_line.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_line.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Breakpoint> + '_ {
        self.by_line.iter().map(|(line, enabled)| Breakpoint {
            line: *line,
            enabled: *enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::BreakpointSet;

    #[test]
    fn add_is_idempotent_and_enabled_by_default() {
        let mut set = BreakpointSet::new();
        set.add(7);
        set.toggle_enabled(7);
        set.add(7);

        assert_eq!(set.len(), 1);
        assert!(!set.is_enabled(7), "re-adding must not reset the flag");
    }

    #[test]
    fn double_toggle_restores_enabled_and_keeps_line() {
        let mut set = BreakpointSet::new();
        set.add(5);
        let original = set.is_enabled(5);

        set.toggle_enabled(5);
        assert!(!set.is_enabled(5));
        set.toggle_enabled(5);

        assert_eq!(set.is_enabled(5), original);
        assert_eq!(set.list(), vec![5]);
    }

    #[test]
    fn list_is_ascending_and_enabled_lines_skip_disabled() {
        let mut set = BreakpointSet::new();
        for line in [12, 3, 8] {
            set.add(line);
        }
        set.toggle_enabled(8);

        assert_eq!(set.list(), vec![3, 8, 12]);
        assert_eq!(set.enabled_lines(), vec![3, 12]);
    }

    #[test]
    fn missing_lines_are_silent_no_ops() {
        let mut set = BreakpointSet::new();
        set.remove(4);
        set.toggle_enabled(4);
        set.add(0);

        assert!(set.is_empty());
        assert!(set.get(4).is_none());
    }

    #[test]
    fn gutter_toggle_adds_then_removes() {
        let mut set = BreakpointSet::new();
        assert!(set.toggle(9));
        assert!(set.contains(9));
        assert!(!set.toggle(9));
        assert!(!set.contains(9));
    }

    #[test]
    fn clear_drops_every_breakpoint() {
        let mut set = BreakpointSet::new();
        set.add(1);
        set.add(2);
        set.clear();
        assert!(set.list().is_empty());
    }
}
