//! Turns the server's tag-annotated byte stream into typed [`StreamEvent`]s
//!
//! Input is buffered until a full `\n`-terminated line is available, so the
//! output does not depend on how the bytes were chunked. State that spans
//! lines (pushed stream, open component, pending room fields, prompt time)
//! lives on the decoder.

mod tags;

use outrider_events::{
    Arrival, Death, Experience, Familiar, LogLine, Room, StreamEvent, StyleHint, Thought, Vitals,
};

use crate::variables::GlobalVariables;
use tags::{Node, Tag};

#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    globals: Option<GlobalVariables>,
    state: DecoderState,
}

#[derive(Debug, Default)]
struct DecoderState {
    stream: Option<String>,
    stream_text: String,
    component: Option<Component>,
    capture: Option<Capture>,
    compass: Option<Vec<String>>,
    room: PendingRoom,
    vitals: Vitals,
    bold_depth: usize,
    presets: Vec<String>,
    style: Option<String>,
    mono: bool,
    prompt_time: Option<i64>,
    /// Game time at which round/cast time ends, settled at the next prompt
    round_end: Option<i64>,
    cast_end: Option<i64>,
}

#[derive(Debug)]
struct Component {
    id: String,
    text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureKind {
    Prompt,
    Left,
    Right,
    Spell,
}

#[derive(Debug)]
struct Capture {
    kind: CaptureKind,
    text: String,
}

#[derive(Debug, Default)]
struct PendingRoom {
    title: String,
    description: String,
    objects: String,
    players: String,
}

/// Main-stream text collected for the current line
#[derive(Debug, Default)]
struct LineBuilder {
    text: String,
    styles: Vec<StyleHint>,
    touched: bool,
    had_tags: bool,
}

impl LineBuilder {
    fn push(&mut self, text: &str, styles: impl IntoIterator<Item = StyleHint>) {
        self.text.push_str(text);
        self.touched = true;
        for style in styles {
            if !self.styles.contains(&style) {
                self.styles.push(style);
            }
        }
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that also maintains the stream-driven global variables
    pub fn with_variables(globals: GlobalVariables) -> Self {
        Self {
            globals: Some(globals),
            ..Self::default()
        }
    }

    /// Consume a chunk of bytes and return the events completed by it
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            self.decode_line(&line, &mut events);
        }
        events
    }

    /// Flush a final line that never got its terminator
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            self.decode_line(&line, &mut events);
        }
        self.flush_vitals(&mut events);
        events
    }

    /// Bytes held back waiting for a line terminator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn decode_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) {
        tracing::trace!(target: "decoder", "Line: {:?}", line);

        let nodes = tags::tokenize(line);
        let mut main = LineBuilder::default();

        if nodes.is_empty() && self.state.stream.is_none() && self.state.component.is_none() {
            out.push(StreamEvent::Log(LogLine::default()));
            return;
        }

        for node in nodes {
            match node {
                Node::Text(text) => self.on_text(&text, &mut main),
                Node::Open(tag) => {
                    main.had_tags = true;
                    self.on_open(tag, &mut main, out);
                }
                Node::Close(name) => {
                    main.had_tags = true;
                    self.on_close(&name, out);
                }
                Node::Malformed(raw) => {
                    tracing::warn!(target: "decoder", "Malformed fragment kept as text: {:?}", raw);
                    main.push(&raw, [StyleHint::Anomaly]);
                }
            }
        }

        if let Some(component) = self.state.component.as_mut() {
            component.text.push('\n');
        }
        self.flush_stream(out);
        self.flush_vitals(out);

        if main.touched && (!main.had_tags || !main.text.trim().is_empty()) {
            out.push(StreamEvent::Log(LogLine {
                text: main.text,
                styles: main.styles,
            }));
        }
    }

    fn current_styles(&self) -> Vec<StyleHint> {
        let mut styles = Vec::new();
        if self.state.bold_depth > 0 {
            styles.push(StyleHint::Bold);
        }
        if self.state.mono {
            styles.push(StyleHint::Mono);
        }
        for preset in &self.state.presets {
            styles.push(StyleHint::Preset(preset.clone()));
        }
        if let Some(style) = &self.state.style {
            styles.push(StyleHint::Preset(style.clone()));
        }
        styles
    }

    fn on_text(&mut self, text: &str, main: &mut LineBuilder) {
        let state = &mut self.state;
        if let Some(component) = state.component.as_mut() {
            component.text.push_str(text);
            return;
        }
        if let Some(capture) = state.capture.as_mut() {
            capture.text.push_str(text);
            if capture.kind == CaptureKind::Prompt {
                let mut styles = self.current_styles();
                styles.push(StyleHint::Prompt);
                main.push(text, styles);
            }
            return;
        }
        if state.compass.is_some() {
            return;
        }
        if state.stream.is_some() {
            state.stream_text.push_str(text);
            return;
        }
        let styles = self.current_styles();
        main.push(text, styles);
    }

    fn on_open(&mut self, tag: Tag, main: &mut LineBuilder, out: &mut Vec<StreamEvent>) {
        match tag.name.as_str() {
            "progressbar" => self.on_progress_bar(&tag, main),
            "streamwindow" => {
                let is_room = matches!(tag.attr("id"), Some("room") | Some("main"));
                if let (true, Some(subtitle)) = (is_room, tag.attr("subtitle")) {
                    let title = subtitle
                        .trim()
                        .trim_start_matches('-')
                        .trim()
                        .trim_matches(|c| c == '[' || c == ']')
                        .to_string();
                    if !title.is_empty() {
                        self.state.room.title = title;
                    }
                }
            }
            "component" => {
                let id = tag.attr("id").unwrap_or_default().to_string();
                if tag.self_closing {
                    self.finish_component(Component { id, text: String::new() }, out);
                } else {
                    self.state.component = Some(Component { id, text: String::new() });
                }
            }
            "compass" => {
                if tag.self_closing {
                    self.emit_room(Vec::new(), out);
                } else {
                    self.state.compass = Some(Vec::new());
                }
            }
            "dir" => {
                if let (Some(exits), Some(value)) = (self.state.compass.as_mut(), tag.attr("value")) {
                    exits.push(expand_direction(value));
                }
            }
            "pushstream" => {
                self.flush_stream(out);
                self.state.stream = tag.attr("id").map(str::to_string);
            }
            "popstream" => {
                self.flush_stream(out);
                self.state.stream = None;
            }
            "prompt" => {
                if let Some(time) = tag.attr("time").and_then(|t| t.trim().parse::<i64>().ok()) {
                    self.state.prompt_time = Some(time);
                    self.set_var("gametime", time.to_string());
                    self.settle_timers(time);
                }
                self.open_capture(CaptureKind::Prompt, &tag);
            }
            "left" => self.open_capture(CaptureKind::Left, &tag),
            "right" => self.open_capture(CaptureKind::Right, &tag),
            "spell" => self.open_capture(CaptureKind::Spell, &tag),
            "roundtime" | "casttime" => {
                let Some(value) = tag.attr("value").and_then(|v| v.trim().parse::<i64>().ok())
                else {
                    self.anomaly(&tag, main);
                    return;
                };
                if tag.name == "roundtime" {
                    self.state.round_end = Some(value);
                } else {
                    self.state.cast_end = Some(value);
                }
            }
            "indicator" => {
                let Some(id) = tag.attr("id") else {
                    self.anomaly(&tag, main);
                    return;
                };
                let name = id.strip_prefix("Icon").unwrap_or(id).to_ascii_lowercase();
                let on = tag.attr("visible") == Some("y");
                self.set_var(name, if on { "1" } else { "0" });
            }
            "pushbold" => self.state.bold_depth += 1,
            "popbold" => self.state.bold_depth = self.state.bold_depth.saturating_sub(1),
            "b" if !tag.self_closing => self.state.bold_depth += 1,
            "preset" if !tag.self_closing => {
                let id = tag.attr("id").unwrap_or_default().to_string();
                self.state.presets.push(id);
            }
            "style" => {
                self.state.style = tag.attr("id").filter(|id| !id.is_empty()).map(str::to_string);
            }
            "output" => {
                self.state.mono = tag.attr("class") == Some("mono");
            }
            other => {
                tracing::trace!(target: "decoder", "Ignoring tag <{}>", other);
            }
        }
    }

    fn on_close(&mut self, name: &str, out: &mut Vec<StreamEvent>) {
        match name {
            "component" => {
                if let Some(component) = self.state.component.take() {
                    self.finish_component(component, out);
                }
            }
            "compass" => {
                if let Some(exits) = self.state.compass.take() {
                    self.emit_room(exits, out);
                }
            }
            "prompt" | "left" | "right" | "spell" => {
                if let Some(capture) = self.state.capture.take() {
                    self.finish_capture(capture);
                }
            }
            "b" => self.state.bold_depth = self.state.bold_depth.saturating_sub(1),
            "preset" => {
                self.state.presets.pop();
            }
            "dialogdata" => self.flush_vitals(out),
            _ => {}
        }
    }

    fn on_progress_bar(&mut self, tag: &Tag, main: &mut LineBuilder) {
        let id = tag.attr("id").map(str::to_ascii_lowercase);
        let value = tag.attr("value").and_then(|v| v.trim().parse::<i64>().ok());
        match (id, value) {
            (Some(id), Some(value)) => {
                let pct = value.clamp(0, 100) as u8;
                self.set_var(id.as_str(), pct.to_string());
                self.state.vitals.values.insert(id, pct);
            }
            _ => self.anomaly(tag, main),
        }
    }

    fn open_capture(&mut self, kind: CaptureKind, tag: &Tag) {
        if tag.self_closing {
            self.finish_capture(Capture {
                kind,
                text: String::new(),
            });
        } else {
            self.state.capture = Some(Capture {
                kind,
                text: String::new(),
            });
        }
    }

    fn finish_capture(&mut self, capture: Capture) {
        let name = match capture.kind {
            CaptureKind::Prompt => "prompt",
            CaptureKind::Left => "lefthand",
            CaptureKind::Right => "righthand",
            CaptureKind::Spell => "preparedspell",
        };
        self.set_var(name, capture.text.trim().to_string());
    }

    fn finish_component(&mut self, component: Component, out: &mut Vec<StreamEvent>) {
        let text = component.text.trim().to_string();
        match component.id.as_str() {
            "room desc" => self.state.room.description = text,
            "room objs" => self.state.room.objects = text,
            "room players" => self.state.room.players = text,
            // Exits come from the compass
            "room exits" => {}
            id => {
                if let Some(skill) = id.strip_prefix("exp ") {
                    if !text.is_empty() {
                        self.emit(StreamEvent::Experience(parse_experience(skill, &text)), out);
                    }
                } else {
                    tracing::trace!(target: "decoder", "Ignoring component {:?}", id);
                }
            }
        }
    }

    fn emit_room(&mut self, exits: Vec<String>, out: &mut Vec<StreamEvent>) {
        let pending = std::mem::take(&mut self.state.room);
        let room = Room {
            title: pending.title,
            description: pending.description,
            objects: pending.objects,
            players: pending.players,
            exits,
        };

        self.set_var("roomtitle", room.title.clone());
        self.set_var("roomdesc", room.description.clone());
        self.set_var("roomobjs", room.objects.clone());
        self.set_var("roomplayers", room.players.clone());
        self.set_var("roomexits", room.exits.join(", "));

        self.emit(StreamEvent::Room(room), out);
    }

    fn flush_stream(&mut self, out: &mut Vec<StreamEvent>) {
        let text = std::mem::take(&mut self.state.stream_text);
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let Some(id) = self.state.stream.clone() else {
            return;
        };
        let text = text.to_string();
        let event = match id.as_str() {
            "thoughts" => StreamEvent::Thought(Thought { text }),
            "logons" => StreamEvent::Arrival(Arrival { text }),
            "death" => StreamEvent::Death(Death { text }),
            "familiar" => StreamEvent::Familiar(Familiar { text }),
            _ => StreamEvent::Log(LogLine::new(text).with_style(StyleHint::Stream(id))),
        };
        self.emit(event, out);
    }

    fn flush_vitals(&mut self, out: &mut Vec<StreamEvent>) {
        if !self.state.vitals.values.is_empty() {
            let vitals = std::mem::take(&mut self.state.vitals);
            out.push(StreamEvent::Vitals(vitals));
        }
    }

    /// Push an event, keeping any vitals seen earlier on the line ahead of it
    fn emit(&mut self, event: StreamEvent, out: &mut Vec<StreamEvent>) {
        self.flush_vitals(out);
        out.push(event);
    }

    fn anomaly(&self, tag: &Tag, main: &mut LineBuilder) {
        tracing::warn!(target: "decoder", "Malformed <{}> kept as text: {:?}", tag.name, tag.raw);
        main.push(&tag.raw, [StyleHint::Anomaly]);
    }

    /// Publish what is left of round and cast time as of the prompt at `now`
    fn settle_timers(&mut self, now: i64) {
        for (name, end) in [
            ("roundtime", &mut self.state.round_end),
            ("casttime", &mut self.state.cast_end),
        ] {
            let Some(at) = *end else { continue };
            let remaining = (at - now).max(0);
            if remaining == 0 {
                *end = None;
            }
            if let Some(globals) = &self.globals {
                globals.set(name, remaining.to_string());
            }
        }
    }

    fn set_var(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Some(globals) = &self.globals {
            globals.set(key, value);
        }
    }
}

fn expand_direction(dir: &str) -> String {
    match dir {
        "n" => "north",
        "ne" => "northeast",
        "e" => "east",
        "se" => "southeast",
        "s" => "south",
        "sw" => "southwest",
        "w" => "west",
        "nw" => "northwest",
        other => other,
    }
    .to_string()
}

/// `"Shield Usage:   5 30% clear"` → ranks `"5 30%"`, mindstate `"clear"`
fn parse_experience(skill: &str, text: &str) -> Experience {
    let detail = text.split_once(':').map(|(_, rest)| rest).unwrap_or(text);
    let words: Vec<&str> = detail.split_whitespace().collect();

    let (ranks, mindstate) = if words.len() >= 2 && words[1].ends_with('%') {
        let mindstate = words[2..].join(" ");
        (
            Some(format!("{} {}", words[0], words[1])),
            (!mindstate.is_empty()).then_some(mindstate),
        )
    } else {
        (None, None)
    };

    Experience {
        skill: skill.to_string(),
        ranks,
        mindstate,
        text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &str) -> Vec<StreamEvent> {
        let mut decoder = StreamDecoder::new();
        let mut events = decoder.feed(input.as_bytes());
        events.extend(decoder.finish());
        events
    }

    fn log(text: &str) -> StreamEvent {
        StreamEvent::Log(LogLine::new(text))
    }

    #[test]
    fn test_plain_lines() {
        assert_eq!(
            decode("You wave.\r\n\nThe sun rises.\n"),
            vec![log("You wave."), log(""), log("The sun rises.")]
        );
    }

    #[test]
    fn test_tag_only_line_emits_nothing() {
        assert!(decode("<output class=\"\"/>\n").is_empty());
    }

    #[test]
    fn test_vitals_grouped_per_line() {
        let events = decode(
            "<dialogData id='minivitals'><progressBar id='health' value='95'/><progressBar id='spirit' value='100'/></dialogData>\n",
        );
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Vitals(v) => {
                assert_eq!(v.get("health"), Some(95));
                assert_eq!(v.get("spirit"), Some(100));
            }
            other => panic!("Expected vitals, got {:?}", other),
        }
    }

    #[test]
    fn test_vital_values_are_clamped() {
        let events = decode("<progressBar id='mana' value='140'/>\n");
        assert!(matches!(&events[0], StreamEvent::Vitals(v) if v.get("mana") == Some(100)));
    }

    #[test]
    fn test_thought_stream_spanning_lines() {
        let events = decode(
            "<pushStream id=\"thoughts\"/><preset id='thought'>[General][Tarn] </preset>\"hello\"\n<popStream/>\n",
        );
        assert_eq!(
            events,
            vec![StreamEvent::Thought(Thought {
                text: "[General][Tarn] \"hello\"".to_string()
            })]
        );
    }

    #[test]
    fn test_unknown_stream_keeps_its_id() {
        let events = decode("<pushStream id='inv'/>a pack\n<popStream/>\n");
        assert_eq!(
            events,
            vec![StreamEvent::Log(
                LogLine::new("a pack").with_style(StyleHint::Stream("inv".to_string()))
            )]
        );
    }

    #[test]
    fn test_arrival_and_death_streams() {
        let events = decode(
            "<pushStream id=\"logons\"/> * Tarn joins the adventure.\n<popStream/>\n<pushStream id=\"death\"/> * Tarn was just struck down!\n<popStream/>\n",
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Arrival(Arrival {
                    text: "* Tarn joins the adventure.".to_string()
                }),
                StreamEvent::Death(Death {
                    text: "* Tarn was just struck down!".to_string()
                }),
            ]
        );
    }

    #[test]
    fn test_experience_component() {
        let events =
            decode("<component id='exp Shield Usage'>   Shield Usage:    5 30% clear</component>\n");
        assert_eq!(
            events,
            vec![StreamEvent::Experience(Experience {
                skill: "Shield Usage".to_string(),
                ranks: Some("5 30%".to_string()),
                mindstate: Some("clear".to_string()),
                text: "Shield Usage:    5 30% clear".to_string(),
            })]
        );
    }

    #[test]
    fn test_empty_experience_component_is_skipped() {
        assert!(decode("<component id='exp Evasion'></component>\n").is_empty());
    }

    #[test]
    fn test_prompt_line() {
        let events = decode("<prompt time=\"1419\">&gt;</prompt>\n");
        assert_eq!(
            events,
            vec![StreamEvent::Log(LogLine::new(">").with_style(StyleHint::Prompt))]
        );
    }

    #[test]
    fn test_bold_and_preset_styles() {
        let events = decode("<pushBold/>A goblin<popBold/> snarls.\n<preset id='speech'>You say</preset>, \"Hi.\"\n");
        match &events[0] {
            StreamEvent::Log(line) => {
                assert_eq!(line.text, "A goblin snarls.");
                assert!(line.has_style(&StyleHint::Bold));
            }
            other => panic!("Expected log line, got {:?}", other),
        }
        match &events[1] {
            StreamEvent::Log(line) => {
                assert_eq!(line.text, "You say, \"Hi.\"");
                assert!(line.has_style(&StyleHint::Preset("speech".to_string())));
            }
            other => panic!("Expected log line, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_fragment_degrades_to_anomaly() {
        let events = decode("Look <pushStream id='x\nnext\n");
        assert_eq!(
            events,
            vec![
                StreamEvent::Log(
                    LogLine::new("Look <pushStream id='x").with_style(StyleHint::Anomaly)
                ),
                log("next"),
            ]
        );
    }

    #[test]
    fn test_auto_variables() {
        let globals = GlobalVariables::new();
        let mut decoder = StreamDecoder::with_variables(globals.clone());
        decoder.feed(
            b"<roundTime value='105'/><left>a sword</left><right>Empty</right>\n<indicator id='IconKNEELING' visible='y'/>\n<prompt time=\"100\">&gt;</prompt>\n",
        );

        assert_eq!(globals.get("gametime").as_deref(), Some("100"));
        assert_eq!(globals.get("prompt").as_deref(), Some(">"));
        assert_eq!(globals.get("roundtime").as_deref(), Some("5"));
        assert_eq!(globals.get("lefthand").as_deref(), Some("a sword"));
        assert_eq!(globals.get("righthand").as_deref(), Some("Empty"));
        assert_eq!(globals.get("kneeling").as_deref(), Some("1"));
    }

    #[test]
    fn test_roundtime_in_the_past_floors_at_zero() {
        let globals = GlobalVariables::new();
        let mut decoder = StreamDecoder::with_variables(globals.clone());
        decoder.feed(b"<roundTime value='150'/>\n<prompt time=\"200\">&gt;</prompt>\n");
        assert_eq!(globals.get("roundtime").as_deref(), Some("0"));
    }

    #[test]
    fn test_roundtime_settles_at_the_following_prompt() {
        let globals = GlobalVariables::new();
        let mut decoder = StreamDecoder::with_variables(globals.clone());

        // The stale prompt must not inflate the value
        decoder.feed(b"<prompt time=\"100\">&gt;</prompt>\n<roundTime value='160'/>\n");
        assert_eq!(globals.get("roundtime"), None);

        decoder.feed(b"You swing.\n<prompt time=\"156\">&gt;</prompt>\n");
        assert_eq!(globals.get("roundtime").as_deref(), Some("4"));

        // Later prompts count it down, then it stays at zero
        decoder.feed(b"<prompt time=\"158\">&gt;</prompt>\n");
        assert_eq!(globals.get("roundtime").as_deref(), Some("2"));
        decoder.feed(b"<prompt time=\"161\">&gt;</prompt>\n<prompt time=\"170\">&gt;</prompt>\n");
        assert_eq!(globals.get("roundtime").as_deref(), Some("0"));

        decoder.feed(b"<castTime value='175'/>\n<prompt time=\"172\">&gt;</prompt>\n");
        assert_eq!(globals.get("casttime").as_deref(), Some("3"));
        assert_eq!(globals.get("roundtime").as_deref(), Some("0"));
    }

    #[test]
    fn test_partial_line_waits_for_terminator() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(b"You w").is_empty());
        assert_eq!(decoder.pending(), 5);
        assert_eq!(decoder.feed(b"ave.\n"), vec![log("You wave.")]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(b"Connection closing").is_empty());
        assert_eq!(decoder.finish(), vec![log("Connection closing")]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_parse_experience_without_ranks() {
        let exp = parse_experience("Athletics", "Athletics: dabbling");
        assert_eq!(exp.ranks, None);
        assert_eq!(exp.mindstate, None);
        assert_eq!(exp.text, "Athletics: dabbling");
    }
}
