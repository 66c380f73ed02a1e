//! In-memory mailbox with scripted transport faults.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use async_trait::async_trait;

use dedupmail::transport::{
    DateWindow, MailboxStatus, MailboxTransport, TransportError, TransportResult,
};
use dedupmail::HeaderDigestInput;

/// Transport operation a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Select,
    Search,
    Fetch,
    Store,
    QueryUnmarked,
    Purge,
    Reconnect,
}

/// What goes wrong on the next call of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Connection drops before the server acts.
    Drop,
    /// The server applies the first `n` items, then the connection drops.
    /// For `Op::Purge` any `n > 0` means the expunge itself went through.
    DropAfter(usize),
    /// The server rejects the command.
    Fatal(&'static str),
}

#[derive(Debug, Clone)]
struct Message {
    input: HeaderDigestInput,
    deleted: bool,
}

pub struct ScriptedMailbox {
    name: String,
    uidvalidity: u32,
    messages: BTreeMap<u32, Message>,
    /// Returned by search but gone by the time headers are fetched.
    ghosts: BTreeSet<u32>,
    connected: bool,
    faults: HashMap<Op, VecDeque<Fault>>,
    uidvalidity_after_reconnect: Option<u32>,

    /// Every mark request received, including ones that failed.
    pub mark_requests: Vec<Vec<u32>>,
    /// How often each UID went from unmarked to marked.
    pub mark_applied: BTreeMap<u32, usize>,
    /// Mark requests that hit an already-marked UID.
    pub redundant_marks: Vec<u32>,
    pub fetch_requests: Vec<Vec<u32>>,
    pub query_requests: Vec<Vec<u32>>,
    pub purge_calls: usize,
    pub reconnects: usize,
    pub expunged: Vec<u32>,
    pub last_window: Option<DateWindow>,
}

impl ScriptedMailbox {
    pub fn new(name: &str, uidvalidity: u32) -> Self {
        Self {
            name: name.to_string(),
            uidvalidity,
            messages: BTreeMap::new(),
            ghosts: BTreeSet::new(),
            connected: true,
            faults: HashMap::new(),
            uidvalidity_after_reconnect: None,
            mark_requests: Vec::new(),
            mark_applied: BTreeMap::new(),
            redundant_marks: Vec::new(),
            fetch_requests: Vec::new(),
            query_requests: Vec::new(),
            purge_calls: 0,
            reconnects: 0,
            expunged: Vec::new(),
            last_window: None,
        }
    }

    pub fn inbox() -> Self {
        Self::new("INBOX", 1)
    }

    pub fn with_message(mut self, uid: u32, input: HeaderDigestInput) -> Self {
        self.insert(uid, input);
        self
    }

    pub fn insert(&mut self, uid: u32, input: HeaderDigestInput) {
        self.messages.insert(
            uid,
            Message {
                input,
                deleted: false,
            },
        );
    }

    /// Makes `uid` show up in search results without existing at fetch time.
    pub fn with_ghost(mut self, uid: u32) -> Self {
        self.ghosts.insert(uid);
        self
    }

    /// Queues a fault for the next call of `op`.
    pub fn fail_next(&mut self, op: Op, fault: Fault) -> &mut Self {
        self.faults.entry(op).or_default().push_back(fault);
        self
    }

    /// Brings a dropped connection back, as a new process connecting would.
    pub fn restore_connection(&mut self) {
        self.connected = true;
    }

    pub fn change_uidvalidity_on_reconnect(&mut self, uidvalidity: u32) {
        self.uidvalidity_after_reconnect = Some(uidvalidity);
    }

    /// UIDs currently present in the mailbox.
    pub fn uids(&self) -> Vec<u32> {
        self.messages.keys().copied().collect()
    }

    /// UIDs currently flagged for deletion but not yet purged.
    pub fn marked(&self) -> Vec<u32> {
        self.messages
            .iter()
            .filter(|(_, m)| m.deleted)
            .map(|(uid, _)| *uid)
            .collect()
    }

    pub fn total_marks_applied(&self) -> usize {
        self.mark_applied.values().sum()
    }

    fn next_fault(&mut self, op: Op) -> Option<Fault> {
        self.faults.get_mut(&op).and_then(|q| q.pop_front())
    }

    fn ensure_connected(&self) -> TransportResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::Failure("connection closed".to_string()))
        }
    }

    fn drop_connection(&mut self) -> TransportError {
        self.connected = false;
        TransportError::Failure("connection reset by peer".to_string())
    }

    fn apply_mark(&mut self, uid: u32) {
        if let Some(message) = self.messages.get_mut(&uid) {
            if message.deleted {
                self.redundant_marks.push(uid);
            } else {
                message.deleted = true;
                *self.mark_applied.entry(uid).or_insert(0) += 1;
            }
        }
    }

    fn expunge(&mut self) {
        let doomed = self.marked();
        for uid in &doomed {
            self.messages.remove(uid);
        }
        self.expunged.extend(doomed);
    }

    fn status(&self) -> MailboxStatus {
        MailboxStatus {
            uidvalidity: self.uidvalidity,
            exists: self.messages.len() as u32,
        }
    }
}

#[async_trait]
impl MailboxTransport for ScriptedMailbox {
    async fn select(&mut self, mailbox: &str) -> TransportResult<MailboxStatus> {
        self.ensure_connected()?;
        match self.next_fault(Op::Select) {
            Some(Fault::Fatal(msg)) => return Err(TransportError::Fatal(msg.to_string())),
            Some(_) => return Err(self.drop_connection()),
            None => {}
        }
        if mailbox != self.name {
            return Err(TransportError::Fatal(format!("no such mailbox: {}", mailbox)));
        }
        Ok(self.status())
    }

    async fn search(&mut self, window: &DateWindow) -> TransportResult<Vec<u32>> {
        self.ensure_connected()?;
        self.last_window = Some(*window);
        match self.next_fault(Op::Search) {
            Some(Fault::Fatal(msg)) => return Err(TransportError::Fatal(msg.to_string())),
            Some(_) => return Err(self.drop_connection()),
            None => {}
        }
        let mut uids: Vec<u32> = self.messages.keys().copied().collect();
        uids.extend(self.ghosts.iter().copied());
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch_headers(
        &mut self,
        uids: &[u32],
    ) -> TransportResult<HashMap<u32, HeaderDigestInput>> {
        self.ensure_connected()?;
        self.fetch_requests.push(uids.to_vec());
        match self.next_fault(Op::Fetch) {
            Some(Fault::Fatal(msg)) => return Err(TransportError::Fatal(msg.to_string())),
            Some(_) => return Err(self.drop_connection()),
            None => {}
        }
        Ok(uids
            .iter()
            .filter_map(|uid| self.messages.get(uid).map(|m| (*uid, m.input.clone())))
            .collect())
    }

    async fn mark_deleted(&mut self, uids: &[u32]) -> TransportResult<()> {
        self.ensure_connected()?;
        self.mark_requests.push(uids.to_vec());
        match self.next_fault(Op::Store) {
            Some(Fault::Fatal(msg)) => Err(TransportError::Fatal(msg.to_string())),
            Some(Fault::Drop) => Err(self.drop_connection()),
            Some(Fault::DropAfter(n)) => {
                for &uid in uids.iter().take(n) {
                    self.apply_mark(uid);
                }
                Err(self.drop_connection())
            }
            None => {
                for &uid in uids {
                    self.apply_mark(uid);
                }
                Ok(())
            }
        }
    }

    async fn query_unmarked(&mut self, uids: &[u32]) -> TransportResult<Vec<u32>> {
        self.ensure_connected()?;
        self.query_requests.push(uids.to_vec());
        match self.next_fault(Op::QueryUnmarked) {
            Some(Fault::Fatal(msg)) => return Err(TransportError::Fatal(msg.to_string())),
            Some(_) => return Err(self.drop_connection()),
            None => {}
        }
        Ok(uids
            .iter()
            .copied()
            .filter(|uid| self.messages.get(uid).is_some_and(|m| !m.deleted))
            .collect())
    }

    async fn purge(&mut self) -> TransportResult<()> {
        self.ensure_connected()?;
        self.purge_calls += 1;
        match self.next_fault(Op::Purge) {
            Some(Fault::Fatal(msg)) => Err(TransportError::Fatal(msg.to_string())),
            Some(Fault::Drop) | Some(Fault::DropAfter(0)) => Err(self.drop_connection()),
            Some(Fault::DropAfter(_)) => {
                self.expunge();
                Err(self.drop_connection())
            }
            None => {
                self.expunge();
                Ok(())
            }
        }
    }

    async fn reconnect_and_reselect(&mut self, mailbox: &str) -> TransportResult<MailboxStatus> {
        self.reconnects += 1;
        self.connected = false;
        match self.next_fault(Op::Reconnect) {
            Some(Fault::Fatal(msg)) => return Err(TransportError::Fatal(msg.to_string())),
            Some(_) => {
                return Err(TransportError::Failure(
                    "reconnect failed: connection refused".to_string(),
                ))
            }
            None => {}
        }
        if let Some(uidvalidity) = self.uidvalidity_after_reconnect.take() {
            self.uidvalidity = uidvalidity;
        }
        self.connected = true;
        self.select(mailbox).await
    }
}
