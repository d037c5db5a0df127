use replay_runtime::Command;
use tracing::debug;

/// Which commands [`CommandLog::extract_range`] hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// Every unsent command. Nothing is stamped.
    All,
    /// Unsent commands that cannot be undone (chat, labels, countdowns).
    /// Each match is stamped sent so it ships exactly once.
    NonUndoable,
    /// Every unsent command, stamping each one sent.
    Pending,
}

impl ExtractMode {
    fn selects(self, command: &Command) -> bool {
        match self {
            ExtractMode::All | ExtractMode::Pending => !command.sent,
            ExtractMode::NonUndoable => !command.undo && !command.sent,
        }
    }

    fn stamps(self) -> bool {
        !matches!(self, ExtractMode::All)
    }
}

/// Ordered command list with a replay cursor.
///
/// Commands before the cursor have been executed (or were recorded locally);
/// commands at or after it are still waiting to be replayed.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    commands: Vec<Command>,
    pos: usize,
    message_locations: Vec<usize>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log loaded from a saved game; the cursor starts at the beginning.
    pub fn from_commands(commands: Vec<Command>) -> Self {
        Self {
            commands,
            pos: 0,
            message_locations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        debug_assert!(self.pos <= self.commands.len());
        self.pos == self.commands.len()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn get(&self, index: usize) -> &Command {
        assert!(
            index < self.commands.len(),
            "command index {index} out of bounds (log holds {})",
            self.commands.len()
        );
        &self.commands[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Command {
        assert!(
            index < self.commands.len(),
            "command index {index} out of bounds (log holds {})",
            self.commands.len()
        );
        &mut self.commands[index]
    }

    /// Record a new command. Only legal once every earlier command has been
    /// replayed.
    pub fn append(&mut self, command: Command) -> &mut Command {
        assert!(
            self.at_end(),
            "appending at {} while {} commands remain unreplayed",
            self.pos,
            self.commands.len() - self.pos
        );
        self.commands.push(command);
        self.pos = self.commands.len();
        let last = self.commands.len() - 1;
        &mut self.commands[last]
    }

    /// Record a non-undoable command at the cursor, then step past it.
    pub fn insert_nonundoable(&mut self, mut command: Command) -> &mut Command {
        command.undo = false;
        let index = self.pos;
        self.insert_at(index, command);
        self.pos = index + 1;
        &mut self.commands[index]
    }

    /// Raw insertion; the cursor and chat offsets shift past the new entry.
    pub fn insert_at(&mut self, index: usize, command: Command) {
        assert!(index <= self.commands.len(), "insert index {index} out of bounds");
        self.commands.insert(index, command);
        if self.pos > index {
            self.pos += 1;
        }
        for location in &mut self.message_locations {
            if *location >= index {
                *location += 1;
            }
        }
    }

    /// Remove one command, keeping the cursor and chat offsets aimed at the
    /// same entries.
    pub fn remove(&mut self, index: usize) -> Command {
        assert!(
            index < self.commands.len(),
            "remove index {index} out of bounds (log holds {})",
            self.commands.len()
        );
        let removed = self.commands.remove(index);
        if self.pos > index {
            self.pos -= 1;
        }
        self.message_locations.retain(|location| *location != index);
        for location in &mut self.message_locations {
            if *location > index {
                *location -= 1;
            }
        }
        removed
    }

    pub fn start(&mut self) {
        self.pos = 0;
    }

    pub fn seek_to_end(&mut self) {
        self.pos = self.commands.len();
    }

    pub fn set_pos(&mut self, pos: usize) {
        assert!(pos <= self.commands.len(), "cursor {pos} past end of log");
        self.pos = pos;
    }

    pub fn rewind_one(&mut self) {
        if self.pos > 0 {
            self.pos -= 1;
        }
    }

    /// Hand out the command under the cursor and advance past it.
    pub fn next_command(&mut self) -> Option<&Command> {
        if self.at_end() {
            return None;
        }
        let index = self.pos;
        self.pos += 1;
        debug!(target: "replay", "up to replay action {}/{}", self.pos, self.commands.len());
        Some(&self.commands[index])
    }

    /// Append commands received from a peer behind the cursor so they are
    /// replayed next.
    pub fn ingest<I>(&mut self, commands: I, mark_as_sent: bool) -> usize
    where
        I: IntoIterator<Item = Command>,
    {
        let before = self.commands.len();
        for mut command in commands {
            if mark_as_sent {
                command.sent = true;
            }
            self.commands.push(command);
        }
        self.commands.len() - before
    }

    /// Copy the commands in `[start, end)` that `mode` selects, stamping them
    /// sent when the mode asks for it.
    pub fn extract_range(&mut self, start: usize, end: usize, mode: ExtractMode) -> Vec<Command> {
        assert!(
            start <= end && end <= self.commands.len(),
            "extract range {start}..{end} outside log of {}",
            self.commands.len()
        );
        let mut extracted = Vec::new();
        for command in &mut self.commands[start..end] {
            if mode.selects(command) {
                if mode.stamps() {
                    command.sent = true;
                }
                extracted.push(command.clone());
            }
        }
        extracted
    }

    /// Note that the command just consumed is a chat line.
    pub fn record_message_location(&mut self) {
        assert!(self.pos > 0, "no consumed command to mark as chat");
        self.message_locations.push(self.pos - 1);
    }

    pub fn message_locations(&self) -> &[usize] {
        &self.message_locations
    }

    pub fn clear_message_locations(&mut self) {
        self.message_locations.clear();
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.pos = 0;
        self.message_locations.clear();
    }
}
