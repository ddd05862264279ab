//! The value tree: an arena of typed nodes with cursor navigation, interned
//! byte payloads, and the encode and decode walks.

use std::fmt;

use crate::atom::{Atom, Kind};
use crate::bytes::WriteCursor;
use crate::codec;
use crate::codes::TypeCode;
use crate::display;
use crate::error::Error;
use crate::format::{self, Fill, Scan};

/// Span into the tree's interned byte store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    offset: usize,
    len: usize,
}

/// Owned node payload. Binary-like kinds hold spans into the interned store,
/// so their bytes stay addressable for the life of the tree no matter how
/// the store grows.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Null,
    Bool(bool),
    Ubyte(u8),
    Byte(i8),
    Ushort(u16),
    Short(i16),
    Uint(u32),
    Int(i32),
    Char(char),
    Ulong(u64),
    Long(i64),
    Timestamp(i64),
    Float(f32),
    Double(f64),
    Decimal32(u32),
    Decimal64(u64),
    Decimal128([u8; 16]),
    Uuid([u8; 16]),
    Binary(Span),
    String(Span),
    Symbol(Span),
    Descriptor,
    Array,
    List,
    Map,
}

impl Value {
    fn kind(&self) -> Kind {
        match self {
            Self::Null => Kind::Null,
            Self::Bool(_) => Kind::Bool,
            Self::Ubyte(_) => Kind::Ubyte,
            Self::Byte(_) => Kind::Byte,
            Self::Ushort(_) => Kind::Ushort,
            Self::Short(_) => Kind::Short,
            Self::Uint(_) => Kind::Uint,
            Self::Int(_) => Kind::Int,
            Self::Char(_) => Kind::Char,
            Self::Ulong(_) => Kind::Ulong,
            Self::Long(_) => Kind::Long,
            Self::Timestamp(_) => Kind::Timestamp,
            Self::Float(_) => Kind::Float,
            Self::Double(_) => Kind::Double,
            Self::Decimal32(_) => Kind::Decimal32,
            Self::Decimal64(_) => Kind::Decimal64,
            Self::Decimal128(_) => Kind::Decimal128,
            Self::Uuid(_) => Kind::Uuid,
            Self::Binary(_) => Kind::Binary,
            Self::String(_) => Kind::String,
            Self::Symbol(_) => Kind::Symbol,
            Self::Descriptor => Kind::Described,
            Self::Array => Kind::Array,
            Self::List => Kind::List,
            Self::Map => Kind::Map,
        }
    }
}

/// Ordered-tree node. Links are 1-based ids into the arena; 0 means none.
#[derive(Debug, Clone)]
struct Node {
    value: Value,
    next: usize,
    prev: usize,
    down: usize,
    parent: usize,
    children: usize,
    // arrays only
    described: bool,
    element_kind: Kind,
}

impl Node {
    fn new() -> Self {
        Self {
            value: Value::Null,
            next: 0,
            prev: 0,
            down: 0,
            parent: 0,
            children: 0,
            described: false,
            element_kind: Kind::Null,
        }
    }
}

/// A saved cursor position, from [`Data::point`].
#[derive(Debug, Clone, Copy)]
pub struct Point {
    parent: usize,
    current: usize,
}

/// An ordered, arbitrarily nested tree of typed values.
///
/// Nodes live in an arena and are addressed by stable indices; binary-like
/// payloads are copied into an interned store owned by the tree, so slices
/// handed out by the `get_*` accessors remain valid until [`Data::clear`].
/// The cursor (`parent`, `current`) names the focus for navigation,
/// insertion and extraction; `current == 0` means "before the first child".
#[derive(Debug, Clone, Default)]
pub struct Data {
    nodes: Vec<Node>,
    interned: Vec<u8>,
    parent: usize,
    current: usize,
    base_parent: usize,
    base_current: usize,
}

impl Data {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            interned: Vec::with_capacity(64),
            parent: 0,
            current: 0,
            base_parent: 0,
            base_current: 0,
        }
    }

    /// Number of live nodes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node, the interned store and the cursor.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.interned.clear();
        self.parent = 0;
        self.current = 0;
        self.base_parent = 0;
        self.base_current = 0;
    }

    fn node(&self, id: usize) -> Option<&Node> {
        id.checked_sub(1).and_then(|index| self.nodes.get(index))
    }

    fn new_node(&mut self) -> usize {
        self.nodes.push(Node::new());
        self.nodes.len()
    }

    fn intern(&mut self, bytes: &[u8]) -> Span {
        let offset = self.interned.len();
        self.interned.extend_from_slice(bytes);
        Span {
            offset,
            len: bytes.len(),
        }
    }

    fn span_bytes(&self, span: Span) -> &[u8] {
        &self.interned[span.offset..span.offset + span.len]
    }

    fn current_value(&self) -> Option<Value> {
        self.node(self.current).map(|node| node.value)
    }

    /// Append a node at the cursor and focus it.
    ///
    /// If the cursor already has a successor (a replayed fill, or a `put`
    /// after `rewind`), that node is reused and overwritten; otherwise a
    /// fresh node is linked in.
    fn add(&mut self) -> usize {
        let id;
        if self.current != 0 {
            let next = self.nodes[self.current - 1].next;
            if next != 0 {
                id = next;
            } else {
                id = self.new_node();
                let current = self.current;
                let parent = self.parent;
                self.nodes[id - 1].prev = current;
                self.nodes[id - 1].parent = parent;
                self.nodes[current - 1].next = id;
                if parent != 0 {
                    if self.nodes[parent - 1].down == 0 {
                        self.nodes[parent - 1].down = id;
                    }
                    self.nodes[parent - 1].children += 1;
                }
            }
        } else if self.parent != 0 {
            let down = self.nodes[self.parent - 1].down;
            if down != 0 {
                id = down;
            } else {
                id = self.new_node();
                let parent = self.parent;
                self.nodes[id - 1].parent = parent;
                self.nodes[parent - 1].down = id;
                self.nodes[parent - 1].children = 1;
            }
        } else if !self.nodes.is_empty() {
            id = 1;
        } else {
            id = self.new_node();
        }
        let node = &mut self.nodes[id - 1];
        node.down = 0;
        node.children = 0;
        self.current = id;
        id
    }

    fn put(&mut self, value: Value) {
        let id = self.add();
        self.nodes[id - 1].value = value;
    }

    pub fn put_null(&mut self) {
        self.put(Value::Null);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.put(Value::Bool(value));
    }

    pub fn put_ubyte(&mut self, value: u8) {
        self.put(Value::Ubyte(value));
    }

    pub fn put_byte(&mut self, value: i8) {
        self.put(Value::Byte(value));
    }

    pub fn put_ushort(&mut self, value: u16) {
        self.put(Value::Ushort(value));
    }

    pub fn put_short(&mut self, value: i16) {
        self.put(Value::Short(value));
    }

    pub fn put_uint(&mut self, value: u32) {
        self.put(Value::Uint(value));
    }

    pub fn put_int(&mut self, value: i32) {
        self.put(Value::Int(value));
    }

    pub fn put_char(&mut self, value: char) {
        self.put(Value::Char(value));
    }

    pub fn put_ulong(&mut self, value: u64) {
        self.put(Value::Ulong(value));
    }

    pub fn put_long(&mut self, value: i64) {
        self.put(Value::Long(value));
    }

    /// Milliseconds since the Unix epoch.
    pub fn put_timestamp(&mut self, value: i64) {
        self.put(Value::Timestamp(value));
    }

    pub fn put_float(&mut self, value: f32) {
        self.put(Value::Float(value));
    }

    pub fn put_double(&mut self, value: f64) {
        self.put(Value::Double(value));
    }

    pub fn put_decimal32(&mut self, value: u32) {
        self.put(Value::Decimal32(value));
    }

    pub fn put_decimal64(&mut self, value: u64) {
        self.put(Value::Decimal64(value));
    }

    pub fn put_decimal128(&mut self, value: [u8; 16]) {
        self.put(Value::Decimal128(value));
    }

    pub fn put_uuid(&mut self, value: [u8; 16]) {
        self.put(Value::Uuid(value));
    }

    /// The bytes are copied into the interned store.
    pub fn put_binary(&mut self, value: &[u8]) {
        let span = self.intern(value);
        self.put(Value::Binary(span));
    }

    /// UTF-8 by convention; the bytes are not validated.
    pub fn put_string(&mut self, value: &[u8]) {
        let span = self.intern(value);
        self.put(Value::String(span));
    }

    /// ASCII by convention; the bytes are not validated.
    pub fn put_symbol(&mut self, value: &[u8]) {
        let span = self.intern(value);
        self.put(Value::Symbol(span));
    }

    /// Append a list; `enter` to add its elements.
    pub fn put_list(&mut self) {
        self.put(Value::List);
    }

    /// Append a map; `enter` to add alternating keys and values.
    pub fn put_map(&mut self) {
        self.put(Value::Map);
    }

    /// Append an array whose direct children must all be `element_kind`.
    /// If `described`, the first child is the array's descriptor value.
    pub fn put_array(&mut self, described: bool, element_kind: Kind) {
        self.put(Value::Array);
        let id = self.current;
        self.nodes[id - 1].described = described;
        self.nodes[id - 1].element_kind = element_kind;
    }

    /// Append a descriptor node; `enter` and add exactly two children, the
    /// descriptor value and the described value.
    pub fn put_described(&mut self) {
        self.put(Value::Descriptor);
    }

    /// Reset the cursor to the narrowing base.
    pub fn rewind(&mut self) {
        self.parent = self.base_parent;
        self.current = self.base_current;
    }

    /// Make the current position the base that `rewind` returns to.
    pub fn narrow(&mut self) {
        self.base_parent = self.parent;
        self.base_current = self.current;
    }

    pub fn widen(&mut self) {
        self.base_parent = 0;
        self.base_current = 0;
    }

    #[must_use]
    pub fn point(&self) -> Point {
        Point {
            parent: self.parent,
            current: self.current,
        }
    }

    /// Restore a saved cursor. Returns false if the point no longer names a
    /// live node.
    pub fn restore(&mut self, point: Point) -> bool {
        if point.current != 0 && point.current <= self.nodes.len() {
            self.current = point.current;
            self.parent = self.nodes[point.current - 1].parent;
            true
        } else if point.parent != 0 && point.parent <= self.nodes.len() {
            self.parent = point.parent;
            self.current = 0;
            true
        } else {
            false
        }
    }

    fn peek_id(&self) -> usize {
        if self.current != 0 {
            self.nodes[self.current - 1].next
        } else if self.parent != 0 {
            self.nodes[self.parent - 1].down
        } else if !self.nodes.is_empty() {
            1
        } else {
            0
        }
    }

    /// Kind of the node the next `next` would land on.
    #[must_use]
    pub fn peek(&self) -> Option<Kind> {
        self.node(self.peek_id()).map(|node| node.value.kind())
    }

    /// Advance to the following sibling (or the first child after `enter`,
    /// or the first root value on a fresh cursor).
    pub fn next(&mut self) -> bool {
        let next = self.peek_id();
        if next != 0 {
            self.current = next;
            true
        } else {
            false
        }
    }

    pub fn prev(&mut self) -> bool {
        match self.node(self.current) {
            Some(node) if node.prev != 0 => {
                self.current = node.prev;
                true
            }
            _ => false,
        }
    }

    /// Descend into the current composite; the cursor lands before its
    /// first child.
    pub fn enter(&mut self) -> bool {
        if self.current != 0 {
            self.parent = self.current;
            self.current = 0;
            true
        } else {
            false
        }
    }

    /// Ascend to the parent composite, which becomes the current node.
    pub fn exit(&mut self) -> bool {
        if self.parent != 0 {
            self.current = self.parent;
            self.parent = self.nodes[self.parent - 1].parent;
            true
        } else {
            false
        }
    }

    /// Kind of the current node, if the cursor is on one.
    #[must_use]
    pub fn kind(&self) -> Option<Kind> {
        self.node(self.current).map(|node| node.value.kind())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.current_value(), Some(Value::Null))
    }

    #[must_use]
    pub fn is_described(&self) -> bool {
        matches!(self.current_value(), Some(Value::Descriptor))
    }

    #[must_use]
    pub fn get_bool(&self) -> bool {
        match self.current_value() {
            Some(Value::Bool(value)) => value,
            _ => false,
        }
    }

    #[must_use]
    pub fn get_ubyte(&self) -> u8 {
        match self.current_value() {
            Some(Value::Ubyte(value)) => value,
            _ => 0,
        }
    }

    #[must_use]
    pub fn get_byte(&self) -> i8 {
        match self.current_value() {
            Some(Value::Byte(value)) => value,
            _ => 0,
        }
    }

    #[must_use]
    pub fn get_ushort(&self) -> u16 {
        match self.current_value() {
            Some(Value::Ushort(value)) => value,
            _ => 0,
        }
    }

    #[must_use]
    pub fn get_short(&self) -> i16 {
        match self.current_value() {
            Some(Value::Short(value)) => value,
            _ => 0,
        }
    }

    #[must_use]
    pub fn get_uint(&self) -> u32 {
        match self.current_value() {
            Some(Value::Uint(value)) => value,
            _ => 0,
        }
    }

    #[must_use]
    pub fn get_int(&self) -> i32 {
        match self.current_value() {
            Some(Value::Int(value)) => value,
            _ => 0,
        }
    }

    #[must_use]
    pub fn get_char(&self) -> char {
        match self.current_value() {
            Some(Value::Char(value)) => value,
            _ => '\0',
        }
    }

    #[must_use]
    pub fn get_ulong(&self) -> u64 {
        match self.current_value() {
            Some(Value::Ulong(value)) => value,
            _ => 0,
        }
    }

    #[must_use]
    pub fn get_long(&self) -> i64 {
        match self.current_value() {
            Some(Value::Long(value)) => value,
            _ => 0,
        }
    }

    #[must_use]
    pub fn get_timestamp(&self) -> i64 {
        match self.current_value() {
            Some(Value::Timestamp(value)) => value,
            _ => 0,
        }
    }

    #[must_use]
    pub fn get_float(&self) -> f32 {
        match self.current_value() {
            Some(Value::Float(value)) => value,
            _ => 0.0,
        }
    }

    #[must_use]
    pub fn get_double(&self) -> f64 {
        match self.current_value() {
            Some(Value::Double(value)) => value,
            _ => 0.0,
        }
    }

    #[must_use]
    pub fn get_decimal32(&self) -> u32 {
        match self.current_value() {
            Some(Value::Decimal32(value)) => value,
            _ => 0,
        }
    }

    #[must_use]
    pub fn get_decimal64(&self) -> u64 {
        match self.current_value() {
            Some(Value::Decimal64(value)) => value,
            _ => 0,
        }
    }

    #[must_use]
    pub fn get_decimal128(&self) -> [u8; 16] {
        match self.current_value() {
            Some(Value::Decimal128(value)) => value,
            _ => [0; 16],
        }
    }

    #[must_use]
    pub fn get_uuid(&self) -> [u8; 16] {
        match self.current_value() {
            Some(Value::Uuid(value)) => value,
            _ => [0; 16],
        }
    }

    /// The interned bytes of a binary node; empty on any other kind.
    #[must_use]
    pub fn get_binary(&self) -> &[u8] {
        match self.current_value() {
            Some(Value::Binary(span)) => self.span_bytes(span),
            _ => &[],
        }
    }

    #[must_use]
    pub fn get_string(&self) -> &[u8] {
        match self.current_value() {
            Some(Value::String(span)) => self.span_bytes(span),
            _ => &[],
        }
    }

    #[must_use]
    pub fn get_symbol(&self) -> &[u8] {
        match self.current_value() {
            Some(Value::Symbol(span)) => self.span_bytes(span),
            _ => &[],
        }
    }

    /// The interned bytes of any binary-like node.
    #[must_use]
    pub fn get_bytes(&self) -> &[u8] {
        match self.current_value() {
            Some(Value::Binary(span) | Value::String(span) | Value::Symbol(span)) => {
                self.span_bytes(span)
            }
            _ => &[],
        }
    }

    /// Child count of the current list; 0 on any other kind.
    #[must_use]
    pub fn get_list(&self) -> usize {
        match self.current_value() {
            Some(Value::List) => self.nodes[self.current - 1].children,
            _ => 0,
        }
    }

    /// Child count of the current map, keys and values both counted.
    #[must_use]
    pub fn get_map(&self) -> usize {
        match self.current_value() {
            Some(Value::Map) => self.nodes[self.current - 1].children,
            _ => 0,
        }
    }

    /// Element count of the current array, excluding the descriptor value.
    #[must_use]
    pub fn get_array(&self) -> usize {
        match self.current_value() {
            Some(Value::Array) => {
                let node = &self.nodes[self.current - 1];
                node.children.saturating_sub(usize::from(node.described))
            }
            _ => 0,
        }
    }

    #[must_use]
    pub fn array_described(&self) -> bool {
        match self.current_value() {
            Some(Value::Array) => self.nodes[self.current - 1].described,
            _ => false,
        }
    }

    #[must_use]
    pub fn array_kind(&self) -> Option<Kind> {
        match self.current_value() {
            Some(Value::Array) => Some(self.nodes[self.current - 1].element_kind),
            _ => None,
        }
    }

    /// Replace this tree with a copy of the values after `src`'s base, and
    /// rewind.
    pub fn copy(&mut self, src: &Data) {
        self.clear();
        self.append(src);
        self.rewind();
    }

    /// Append every value after `src`'s narrowing base, structure preserved.
    /// Payload bytes are re-interned here, so later mutation of `src` cannot
    /// reach this tree.
    pub fn append(&mut self, src: &Data) {
        self.append_after_base(src, None);
    }

    /// As [`Self::append`], but at most `limit` top-level values.
    pub fn appendn(&mut self, src: &Data, limit: usize) {
        self.append_after_base(src, Some(limit));
    }

    fn append_after_base(&mut self, src: &Data, limit: Option<usize>) {
        let mut id = if src.base_current != 0 {
            src.nodes[src.base_current - 1].next
        } else if src.base_parent != 0 {
            src.nodes[src.base_parent - 1].down
        } else if !src.nodes.is_empty() {
            1
        } else {
            0
        };
        let mut count = 0;
        while id != 0 {
            if Some(count) == limit {
                break;
            }
            self.append_node(src, id);
            count += 1;
            id = src.nodes[id - 1].next;
        }
    }

    fn append_node(&mut self, src: &Data, id: usize) {
        let node = &src.nodes[id - 1];
        match node.value {
            Value::Null => self.put_null(),
            Value::Bool(value) => self.put_bool(value),
            Value::Ubyte(value) => self.put_ubyte(value),
            Value::Byte(value) => self.put_byte(value),
            Value::Ushort(value) => self.put_ushort(value),
            Value::Short(value) => self.put_short(value),
            Value::Uint(value) => self.put_uint(value),
            Value::Int(value) => self.put_int(value),
            Value::Char(value) => self.put_char(value),
            Value::Ulong(value) => self.put_ulong(value),
            Value::Long(value) => self.put_long(value),
            Value::Timestamp(value) => self.put_timestamp(value),
            Value::Float(value) => self.put_float(value),
            Value::Double(value) => self.put_double(value),
            Value::Decimal32(value) => self.put_decimal32(value),
            Value::Decimal64(value) => self.put_decimal64(value),
            Value::Decimal128(value) => self.put_decimal128(value),
            Value::Uuid(value) => self.put_uuid(value),
            Value::Binary(span) => self.put_binary(src.span_bytes(span)),
            Value::String(span) => self.put_string(src.span_bytes(span)),
            Value::Symbol(span) => self.put_symbol(src.span_bytes(span)),
            Value::Descriptor => self.put_described(),
            Value::Array => self.put_array(node.described, node.element_kind),
            Value::List => self.put_list(),
            Value::Map => self.put_map(),
        }
        if matches!(
            node.value,
            Value::Descriptor | Value::Array | Value::List | Value::Map
        ) {
            self.enter();
            let mut child = node.down;
            while child != 0 {
                self.append_node(src, child);
                child = src.nodes[child - 1].next;
            }
            self.exit();
        }
    }

    /// Append the element following `src`'s cursor, if any.
    pub(crate) fn append_peeked(&mut self, src: &Data) -> bool {
        let id = src.peek_id();
        if id == 0 {
            return false;
        }
        self.append_node(src, id);
        true
    }

    pub(crate) fn parent_kind(&self) -> Option<Kind> {
        self.node(self.parent).map(|node| node.value.kind())
    }

    pub(crate) fn parent_children(&self) -> usize {
        self.node(self.parent).map_or(0, |node| node.children)
    }

    /// Drop the children links of the current node (the body a failed fill
    /// predicate swallowed). The nodes stay in the arena until `clear`.
    pub(crate) fn truncate_current(&mut self) {
        if self.current != 0 {
            let node = &mut self.nodes[self.current - 1];
            node.down = 0;
            node.children = 0;
        }
    }

    /// Stamp the element kind on the array the cursor is inside; false when
    /// the enclosing node is not an array.
    pub(crate) fn set_parent_array_kind(&mut self, kind: Kind) -> bool {
        if self.parent != 0 && matches!(self.nodes[self.parent - 1].value, Value::Array) {
            self.nodes[self.parent - 1].element_kind = kind;
            true
        } else {
            false
        }
    }

    pub(crate) fn point_raw(&self) -> (usize, usize) {
        (self.parent, self.current)
    }

    pub(crate) fn set_point_raw(&mut self, point: (usize, usize)) {
        self.parent = point.0;
        self.current = point.1;
    }

    /// Fill the tree from a format string; see the crate docs for the
    /// grammar. Arguments are consumed in format order.
    pub fn fill(&mut self, fmt: &str, args: &[Fill<'_>]) -> Result<(), Error> {
        format::vfill(self, fmt, args)
    }

    /// Scan the tree against a format string, writing extracted values
    /// through `args` in format order. Rewinds first.
    pub fn scan(&mut self, fmt: &str, args: &mut [Scan<'_>]) -> Result<(), Error> {
        format::vscan(self, fmt, args)
    }

    /// Serialize the whole tree into `buffer`; returns the bytes written.
    /// On error the buffer holds whatever prefix was written.
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, Error> {
        let mut cursor = WriteCursor::new(buffer);
        let mut starts = vec![0usize; self.nodes.len() + 1];
        let mut id = usize::from(!self.nodes.is_empty());
        while id != 0 {
            let node = &self.nodes[id - 1];
            self.encode_node(id, &mut cursor, &mut starts)?;
            let mut next = 0;
            if node.down != 0 {
                next = node.down;
            } else {
                self.encode_exit(id, &mut cursor, &starts)?;
                if node.next != 0 {
                    next = node.next;
                } else {
                    let mut parent = node.parent;
                    while parent != 0 {
                        self.encode_exit(parent, &mut cursor, &starts)?;
                        let up = &self.nodes[parent - 1];
                        if up.next != 0 {
                            next = up.next;
                            break;
                        }
                        parent = up.parent;
                    }
                }
            }
            id = next;
        }
        Ok(cursor.offset())
    }

    /// [`Self::encode`] into a fresh buffer, growing on overflow.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, Error> {
        let mut size = 64;
        loop {
            let mut buffer = vec![0; size];
            match self.encode(&mut buffer) {
                Ok(written) => {
                    buffer.truncate(written);
                    return Ok(buffer);
                }
                Err(Error::Overflow) => size *= 2,
                Err(err) => return Err(err),
            }
        }
    }

    fn encode_node(
        &self,
        id: usize,
        cursor: &mut WriteCursor<'_>,
        starts: &mut [usize],
    ) -> Result<(), Error> {
        let node = &self.nodes[id - 1];
        let code = match self.node(node.parent) {
            Some(parent) if matches!(parent.value, Value::Array) => {
                if parent.described && node.prev == 0 {
                    // the descriptor value is self-describing; it precedes
                    // the element code on the wire
                    let code = compact_code(node);
                    cursor.write_u8(code as u8)?;
                    code
                } else {
                    let code = TypeCode::canonical(parent.element_kind);
                    let first_element = if parent.described {
                        node.prev != 0 && self.nodes[node.prev - 1].prev == 0
                    } else {
                        node.prev == 0
                    };
                    if first_element {
                        cursor.write_u8(code as u8)?;
                    }
                    code
                }
            }
            _ => {
                let code = compact_code(node);
                cursor.write_u8(code as u8)?;
                code
            }
        };
        self.encode_value(id, node, code, cursor, starts)
    }

    fn encode_value(
        &self,
        id: usize,
        node: &Node,
        code: TypeCode,
        cursor: &mut WriteCursor<'_>,
        starts: &mut [usize],
    ) -> Result<(), Error> {
        use TypeCode as C;
        match (code, node.value) {
            (C::Described, Value::Descriptor)
            | (C::Null, Value::Null)
            | (C::True, Value::Bool(true))
            | (C::False, Value::Bool(false))
            | (C::Uint0, Value::Uint(0))
            | (C::Ulong0, Value::Ulong(0)) => Ok(()),
            (C::Boolean, Value::Bool(value)) => Ok(cursor.write_u8(u8::from(value))?),
            (C::Ubyte, Value::Ubyte(value)) => Ok(cursor.write_u8(value)?),
            (C::Byte, Value::Byte(value)) => Ok(cursor.write_u8(value as u8)?),
            (C::SmallUint, Value::Uint(value)) => Ok(cursor.write_u8(value as u8)?),
            (C::SmallInt, Value::Int(value)) => Ok(cursor.write_u8(value as u8)?),
            (C::SmallUlong, Value::Ulong(value)) => Ok(cursor.write_u8(value as u8)?),
            (C::SmallLong, Value::Long(value)) => Ok(cursor.write_u8(value as u8)?),
            (C::Ushort, Value::Ushort(value)) => Ok(cursor.write_u16(value)?),
            (C::Short, Value::Short(value)) => Ok(cursor.write_u16(value as u16)?),
            (C::Uint, Value::Uint(value)) => Ok(cursor.write_u32(value)?),
            (C::Int, Value::Int(value)) => Ok(cursor.write_u32(value as u32)?),
            (C::Char, Value::Char(value)) => Ok(cursor.write_u32(value as u32)?),
            (C::Float, Value::Float(value)) => Ok(cursor.write_u32(value.to_bits())?),
            (C::Decimal32, Value::Decimal32(value)) => Ok(cursor.write_u32(value)?),
            (C::Ulong, Value::Ulong(value)) => Ok(cursor.write_u64(value)?),
            (C::Long, Value::Long(value)) => Ok(cursor.write_u64(value as u64)?),
            (C::Timestamp, Value::Timestamp(value)) => Ok(cursor.write_u64(value as u64)?),
            (C::Double, Value::Double(value)) => Ok(cursor.write_u64(value.to_bits())?),
            (C::Decimal64, Value::Decimal64(value)) => Ok(cursor.write_u64(value)?),
            (C::Decimal128, Value::Decimal128(value)) => Ok(cursor.write_bytes(&value)?),
            (C::Uuid, Value::Uuid(value)) => Ok(cursor.write_bytes(&value)?),
            (
                C::Vbin8 | C::Str8 | C::Sym8,
                Value::Binary(span) | Value::String(span) | Value::Symbol(span),
            ) => Ok(cursor.write_v8(self.span_bytes(span))?),
            (
                C::Vbin32 | C::Str32 | C::Sym32,
                Value::Binary(span) | Value::String(span) | Value::Symbol(span),
            ) => Ok(cursor.write_v32(self.span_bytes(span))?),
            (C::Array32, Value::Array) => {
                starts[id] = cursor.skip(4)?;
                let count = node.children.saturating_sub(usize::from(node.described));
                cursor.write_u32(count as u32)?;
                if node.described {
                    cursor.write_u8(TypeCode::Described as u8)?;
                }
                Ok(())
            }
            (C::List32, Value::List) => {
                starts[id] = cursor.skip(4)?;
                Ok(cursor.write_u32(node.children as u32)?)
            }
            (C::Map32, Value::Map) => {
                if node.children % 2 != 0 {
                    return Err(Error::OddMapChildren(node.children));
                }
                starts[id] = cursor.skip(4)?;
                Ok(cursor.write_u32(node.children as u32)?)
            }
            _ => Err(Error::KindMismatch {
                expected: code.kind().unwrap_or(Kind::Described),
                found: node.value.kind(),
            }),
        }
    }

    fn encode_exit(
        &self,
        id: usize,
        cursor: &mut WriteCursor<'_>,
        starts: &[usize],
    ) -> Result<(), Error> {
        let node = &self.nodes[id - 1];
        match node.value {
            Value::Array => {
                // an empty array still needs its element code on the wire
                if node.children == usize::from(node.described) {
                    cursor.write_u8(TypeCode::canonical(node.element_kind) as u8)?;
                }
                self.patch_size(id, cursor, starts)
            }
            Value::List | Value::Map => self.patch_size(id, cursor, starts),
            _ => Ok(()),
        }
    }

    fn patch_size(
        &self,
        id: usize,
        cursor: &mut WriteCursor<'_>,
        starts: &[usize],
    ) -> Result<(), Error> {
        let start = starts[id];
        let size = cursor.offset() - start - 4;
        Ok(cursor.patch_u32(start, size as u32)?)
    }

    /// Clear this tree and rebuild it from one encoded top-level value.
    /// Returns the input bytes consumed, so a caller draining a stream can
    /// re-enter at the next value. On error the tree may be partially
    /// rebuilt; `clear` and retry or drop it.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        self.clear();
        let mut atoms = Vec::new();
        let consumed = codec::decode_one(bytes, &mut atoms)?;
        self.parse_atoms(&atoms, 0, None)?;
        Ok(consumed)
    }

    /// Rebuild tree structure from a flat atom stream; returns the atoms
    /// consumed.
    fn parse_atoms(
        &mut self,
        atoms: &[Atom<'_>],
        offset: usize,
        limit: Option<usize>,
    ) -> Result<usize, Error> {
        let mut i = offset;
        let mut count = 0;
        while i < atoms.len() {
            if Some(count) == limit {
                break;
            }
            match atoms[i] {
                Atom::Null => self.put_null(),
                Atom::Bool(value) => self.put_bool(value),
                Atom::Ubyte(value) => self.put_ubyte(value),
                Atom::Byte(value) => self.put_byte(value),
                Atom::Ushort(value) => self.put_ushort(value),
                Atom::Short(value) => self.put_short(value),
                Atom::Uint(value) => self.put_uint(value),
                Atom::Int(value) => self.put_int(value),
                Atom::Char(value) => self.put_char(value),
                Atom::Ulong(value) => self.put_ulong(value),
                Atom::Long(value) => self.put_long(value),
                Atom::Timestamp(value) => self.put_timestamp(value),
                Atom::Float(value) => self.put_float(value),
                Atom::Double(value) => self.put_double(value),
                Atom::Decimal32(value) => self.put_decimal32(value),
                Atom::Decimal64(value) => self.put_decimal64(value),
                Atom::Decimal128(value) => self.put_decimal128(value),
                Atom::Uuid(value) => self.put_uuid(value),
                Atom::Binary(value) => self.put_binary(value),
                Atom::String(value) => self.put_string(value),
                Atom::Symbol(value) => self.put_symbol(value),
                Atom::List(n) => {
                    self.put_list();
                    self.enter();
                    i += self.parse_atoms(atoms, i + 1, Some(n))?;
                    self.exit();
                }
                Atom::Map(n) => {
                    self.put_map();
                    self.enter();
                    i += self.parse_atoms(atoms, i + 1, Some(n))?;
                    self.exit();
                }
                Atom::Array(n) => {
                    let described = matches!(atoms.get(i + 1), Some(Atom::Descriptor));
                    self.put_array(described, Kind::Null);
                    let array = self.current;
                    self.enter();
                    if described {
                        i += 1;
                        i += self.parse_atoms(atoms, i + 1, Some(1))?;
                    }
                    let Some(Atom::ElementKind(kind)) = atoms.get(i + 1).copied() else {
                        return Err(Error::MissingElementKind);
                    };
                    self.nodes[array - 1].element_kind = kind;
                    i += 1;
                    i += self.parse_atoms(atoms, i + 1, Some(n))?;
                    self.exit();
                }
                Atom::Descriptor => {
                    self.put_described();
                    self.enter();
                    i += self.parse_atoms(atoms, i + 1, Some(2))?;
                    self.exit();
                }
                Atom::ElementKind(_) => return Err(Error::StrayElementKind),
            }
            count += 1;
            i += 1;
        }
        Ok(i - offset)
    }

    /// Flatten the tree to its wire-ordered atom stream: array nodes are
    /// followed by their element-kind reference (after the descriptor pair
    /// when described), exactly the shape `decode` produces.
    #[must_use]
    pub fn as_atoms(&self) -> Vec<Atom<'_>> {
        let mut atoms = Vec::with_capacity(self.nodes.len());
        let mut id = usize::from(!self.nodes.is_empty());
        while id != 0 {
            let node = &self.nodes[id - 1];
            atoms.push(self.node_atom(node));
            if let Value::Array = node.value {
                if node.described {
                    atoms.push(Atom::Descriptor);
                } else {
                    atoms.push(Atom::ElementKind(node.element_kind));
                }
            }
            let parent = self.node(node.parent);
            if let Some(up) = parent {
                if matches!(up.value, Value::Array) && up.described && up.down == id {
                    atoms.push(Atom::ElementKind(up.element_kind));
                }
            }
            let mut next = 0;
            if node.down != 0 {
                next = node.down;
            } else if node.next != 0 {
                next = node.next;
            } else {
                let mut parent = node.parent;
                while parent != 0 {
                    let up = &self.nodes[parent - 1];
                    if up.next != 0 {
                        next = up.next;
                        break;
                    }
                    parent = up.parent;
                }
            }
            id = next;
        }
        atoms
    }

    fn node_atom(&self, node: &Node) -> Atom<'_> {
        match node.value {
            Value::Null => Atom::Null,
            Value::Bool(value) => Atom::Bool(value),
            Value::Ubyte(value) => Atom::Ubyte(value),
            Value::Byte(value) => Atom::Byte(value),
            Value::Ushort(value) => Atom::Ushort(value),
            Value::Short(value) => Atom::Short(value),
            Value::Uint(value) => Atom::Uint(value),
            Value::Int(value) => Atom::Int(value),
            Value::Char(value) => Atom::Char(value),
            Value::Ulong(value) => Atom::Ulong(value),
            Value::Long(value) => Atom::Long(value),
            Value::Timestamp(value) => Atom::Timestamp(value),
            Value::Float(value) => Atom::Float(value),
            Value::Double(value) => Atom::Double(value),
            Value::Decimal32(value) => Atom::Decimal32(value),
            Value::Decimal64(value) => Atom::Decimal64(value),
            Value::Decimal128(value) => Atom::Decimal128(value),
            Value::Uuid(value) => Atom::Uuid(value),
            Value::Binary(span) => Atom::Binary(self.span_bytes(span)),
            Value::String(span) => Atom::String(self.span_bytes(span)),
            Value::Symbol(span) => Atom::Symbol(self.span_bytes(span)),
            Value::Descriptor => Atom::Descriptor,
            Value::Array => {
                Atom::Array(node.children.saturating_sub(usize::from(node.described)))
            }
            Value::List => Atom::List(node.children),
            Value::Map => Atom::Map(node.children),
        }
    }
}

impl fmt::Display for Data {
    /// Debug pretty-print: `@d v` described values, `[…]` lists, `{k=v, …}`
    /// maps, `@kind[…]` arrays.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display::fmt_atoms(&self.as_atoms(), f)
    }
}

/// Most compact wire code able to carry this node's value.
fn compact_code(node: &Node) -> TypeCode {
    match node.value {
        Value::Bool(true) => TypeCode::True,
        Value::Bool(false) => TypeCode::False,
        Value::Uint(0) => TypeCode::Uint0,
        Value::Uint(1..=255) => TypeCode::SmallUint,
        Value::Ulong(0) => TypeCode::Ulong0,
        Value::Ulong(1..=255) => TypeCode::SmallUlong,
        Value::Int(value) if i8::try_from(value).is_ok() => TypeCode::SmallInt,
        Value::Long(value) if i8::try_from(value).is_ok() => TypeCode::SmallLong,
        Value::Binary(span) if span.len < 256 => TypeCode::Vbin8,
        Value::String(span) if span.len < 256 => TypeCode::Str8,
        Value::Symbol(span) if span.len < 256 => TypeCode::Sym8,
        _ => TypeCode::canonical(node.value.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation() {
        let mut data = Data::new(4);
        data.put_uint(1);
        data.put_list();
        data.enter();
        data.put_string(b"a");
        data.put_string(b"b");
        data.exit();
        data.put_bool(true);

        data.rewind();
        assert!(data.next());
        assert_eq!(Some(Kind::Uint), data.kind());
        assert_eq!(1, data.get_uint());
        assert_eq!(0, data.get_int());
        assert!(data.next());
        assert_eq!(2, data.get_list());
        assert!(data.enter());
        assert_eq!(None, data.kind());
        assert!(data.next());
        assert_eq!(b"a", data.get_string());
        assert!(data.next());
        assert_eq!(b"b", data.get_string());
        assert!(!data.next());
        assert!(data.prev());
        assert_eq!(b"a", data.get_string());
        assert!(data.exit());
        assert_eq!(Some(Kind::List), data.kind());
        assert!(data.next());
        assert!(data.get_bool());
        assert!(!data.next());
        assert!(!data.exit());
    }

    #[test]
    fn replay_overwrites_in_place() {
        let mut data = Data::new(0);
        data.put_uint(1);
        data.put_uint(2);
        data.rewind();
        data.put_uint(3);
        data.put_uint(4);
        assert_eq!(2, data.size());
        data.rewind();
        data.next();
        assert_eq!(3, data.get_uint());
        data.next();
        assert_eq!(4, data.get_uint());
    }

    #[test]
    fn interned_bytes_survive_growth() {
        let mut data = Data::new(1);
        let payloads: Vec<Vec<u8>> = (0..100u8).map(|i| vec![i; 40]).collect();
        for payload in &payloads {
            data.put_string(payload);
        }
        data.rewind();
        for payload in &payloads {
            assert!(data.next());
            assert_eq!(payload.as_slice(), data.get_string());
        }
    }

    #[test]
    fn point_and_restore() {
        let mut data = Data::new(0);
        data.put_uint(1);
        let point = data.point();
        data.put_uint(2);
        assert!(data.restore(point));
        assert_eq!(1, data.get_uint());
        assert!(data.next());
        assert_eq!(2, data.get_uint());
        assert!(!data.restore(Point {
            parent: 0,
            current: 99
        }));
    }

    #[test]
    fn narrow_anchors_rewind() {
        let mut data = Data::new(0);
        data.put_uint(1);
        data.put_uint(2);
        data.put_uint(3);
        data.rewind();
        data.next();
        data.narrow();
        data.rewind();
        assert!(data.next());
        assert_eq!(2, data.get_uint());
        data.widen();
        data.rewind();
        assert!(data.next());
        assert_eq!(1, data.get_uint());
    }

    #[test]
    fn append_starts_after_the_base() {
        let mut src = Data::new(0);
        src.put_uint(1);
        src.put_uint(2);
        src.put_uint(3);

        let mut dst = Data::new(0);
        dst.appendn(&src, 2);
        assert_eq!(2, dst.size());
        dst.rewind();
        dst.next();
        assert_eq!(1, dst.get_uint());

        src.rewind();
        src.next();
        src.narrow();
        let mut tail = Data::new(0);
        tail.append(&src);
        assert_eq!(2, tail.size());
        tail.rewind();
        tail.next();
        assert_eq!(2, tail.get_uint());
    }

    #[test]
    fn copy_is_isolated_from_source_mutation() {
        let mut src = Data::new(0);
        src.put_string(b"first");
        let mut dst = Data::new(0);
        dst.copy(&src);
        src.rewind();
        src.put_string(b"overwritten");
        src.put_string(b"more");
        dst.rewind();
        assert!(dst.next());
        assert_eq!(b"first", dst.get_string());
        assert_eq!(1, dst.size());
    }

    #[test]
    fn as_atoms_orders_described_arrays() {
        let mut data = Data::new(0);
        data.put_array(true, Kind::Uint);
        data.enter();
        data.put_symbol(b"d");
        data.put_uint(1);
        data.put_uint(2);
        data.exit();
        assert_eq!(
            vec![
                Atom::Array(2),
                Atom::Descriptor,
                Atom::Symbol(b"d"),
                Atom::ElementKind(Kind::Uint),
                Atom::Uint(1),
                Atom::Uint(2),
            ],
            data.as_atoms()
        );
    }

    #[test]
    fn clear_resets_everything() {
        let mut data = Data::new(0);
        data.put_list();
        data.enter();
        data.put_string(b"x");
        data.clear();
        assert_eq!(0, data.size());
        assert!(!data.next());
        data.put_uint(9);
        assert_eq!(1, data.size());
    }
}
