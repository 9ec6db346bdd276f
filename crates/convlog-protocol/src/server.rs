//! Upload-pack server: the peer-facing half of a fetch, one per channel.

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use convlog_pack::{missing_objects, PackWriter};
use convlog_refs::RefStore;
use convlog_store::{ObjectKind, ObjectStore};
use convlog_types::ObjectId;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{
    AckStatus, Band, Request, Response, MAX_FETCH_SIZE, PROTOCOL_VERSION, SERVER_CAPABILITIES,
    SIDEBAND_MAX_DATA,
};
use crate::pktline::PktLineDecoder;

/// Bytes to send back for one chunk of input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerOutput {
    pub reply: Bytes,
    /// Set when a pack for this commit was fully written to `reply`.
    pub served: Option<ObjectId>,
}

/// Answers fetch requests for one conversation over one channel.
///
/// Input may arrive split at any byte; incomplete lines are buffered until
/// the rest arrives.
pub struct UploadPackServer<'a> {
    conversation: String,
    store: &'a dyn ObjectStore,
    refs: &'a dyn RefStore,
    decoder: PktLineDecoder,
    wanted: Option<ObjectId>,
    haves: Vec<ObjectId>,
    common: Option<ObjectId>,
    sideband_chunk: usize,
    max_pack_size: usize,
}

impl<'a> UploadPackServer<'a> {
    pub fn new(
        conversation: impl Into<String>,
        store: &'a dyn ObjectStore,
        refs: &'a dyn RefStore,
    ) -> Self {
        Self {
            conversation: conversation.into(),
            store,
            refs,
            decoder: PktLineDecoder::new(),
            wanted: None,
            haves: Vec::new(),
            common: None,
            sideband_chunk: SIDEBAND_MAX_DATA,
            max_pack_size: MAX_FETCH_SIZE,
        }
    }

    pub fn with_limits(mut self, sideband_chunk: usize, max_pack_size: usize) -> Self {
        self.sideband_chunk = sideband_chunk.clamp(1, SIDEBAND_MAX_DATA);
        self.max_pack_size = max_pack_size;
        self
    }

    /// Common base recorded from the peer's `have` lines so far.
    pub fn common(&self) -> Option<ObjectId> {
        self.common
    }

    /// Consume `input` and produce the reply.
    pub fn receive(&mut self, input: &[u8]) -> ProtocolResult<ServerOutput> {
        self.decoder.feed(input);
        let mut reply = BytesMut::new();
        let mut served = None;
        while let Some(line) = self.decoder.next_line()? {
            let request = match Request::decode(&line) {
                Ok(request) => request,
                Err(ProtocolError::UnexpectedLine(text)) => {
                    warn!(conversation = %self.conversation, line = %text, "ignoring unexpected line");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(id) = self.handle(request, &mut reply)? {
                served = Some(id);
            }
        }
        Ok(ServerOutput {
            reply: reply.freeze(),
            served,
        })
    }

    fn handle(&mut self, request: Request, reply: &mut BytesMut) -> ProtocolResult<Option<ObjectId>> {
        match request {
            Request::UploadPack {
                conversation,
                params,
            } => {
                if conversation != self.conversation {
                    return Err(ProtocolError::UnknownConversation {
                        expected: self.conversation.clone(),
                        got: conversation,
                    });
                }
                if let Some(version) = params.get("version") {
                    if version.parse::<u32>().ok() != Some(PROTOCOL_VERSION) {
                        return Err(ProtocolError::UnsupportedVersion(version.clone()));
                    }
                    Response::Version(PROTOCOL_VERSION).encode(reply)?;
                }
                self.advertise(reply)?;
            }
            Request::Want { id, .. } => {
                if !self.store.exists(&id)? {
                    return Err(ProtocolError::UnknownWant(id));
                }
                debug!(conversation = %self.conversation, want = %id.short_hex(), "peer wants");
                self.wanted = Some(id);
            }
            Request::Have(id) => {
                self.haves.push(id);
                if self.common.is_none() && self.is_local_commit(&id)? {
                    self.common = Some(id);
                }
            }
            Request::Flush => {
                if !self.haves.is_empty() {
                    if let Some(id) = self.common {
                        Response::Ack {
                            id,
                            status: AckStatus::Continue,
                        }
                        .encode(reply)?;
                    }
                    Response::Nak.encode(reply)?;
                }
            }
            Request::Done => return self.send_pack(reply),
        }
        Ok(None)
    }

    fn advertise(&self, reply: &mut BytesMut) -> ProtocolResult<()> {
        let head = self.refs.head()?.ok_or(ProtocolError::NoHead)?;
        Response::Ref {
            id: head,
            name: "HEAD".into(),
            capabilities: Some(SERVER_CAPABILITIES.into()),
        }
        .encode(reply)?;
        for (name, reference) in self.refs.list_refs("refs/")? {
            Response::Ref {
                id: reference.target(),
                name,
                capabilities: None,
            }
            .encode(reply)?;
        }
        Response::Flush.encode(reply)
    }

    /// Answer `done`. A pack over the size limit is replaced by an error
    /// on side-band 3.
    fn send_pack(&mut self, reply: &mut BytesMut) -> ProtocolResult<Option<ObjectId>> {
        let want = self.wanted.take().ok_or(ProtocolError::MissingWant)?;
        let haves = std::mem::take(&mut self.haves);
        let common = self.common.take();

        match common {
            Some(id) => Response::Ack {
                id,
                status: AckStatus::Final,
            }
            .encode(reply)?,
            None => Response::Nak.encode(reply)?,
        }

        let mut bases = Vec::new();
        for id in haves {
            if self.is_local_commit(&id)? {
                bases.push(id);
            }
        }
        let mut writer = PackWriter::new();
        writer.add_from_store(self.store, &missing_objects(self.store, &[want], &bases)?)?;
        let objects = writer.len();
        let pack = Bytes::from(writer.finish()?);

        if pack.len() > self.max_pack_size {
            warn!(
                conversation = %self.conversation,
                size = pack.len(),
                max = self.max_pack_size,
                "pack exceeds transfer limit"
            );
            Response::SideBand {
                band: Band::Error,
                data: Bytes::from(format!("pack too large: {} bytes", pack.len())),
            }
            .encode(reply)?;
            Response::Flush.encode(reply)?;
            return Ok(None);
        }

        for chunk in Response::sideband_chunks(&pack, self.sideband_chunk) {
            chunk.encode(reply)?;
        }
        Response::Flush.encode(reply)?;
        info!(
            conversation = %self.conversation,
            want = %want.short_hex(),
            base = ?common.map(|id| id.short_hex()),
            objects,
            bytes = pack.len(),
            "served pack"
        );
        Ok(Some(want))
    }

    fn is_local_commit(&self, id: &ObjectId) -> ProtocolResult<bool> {
        Ok(self
            .store
            .read(id)?
            .is_some_and(|object| object.kind == ObjectKind::Commit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Advertisement, PackReceiver};
    use crate::pktline::PktLine;
    use convlog_crypto::SigningKey;
    use convlog_pack::PackReader;
    use convlog_refs::{branch_ref_name, InMemoryRefStore, Ref, MAIN_BRANCH};
    use convlog_store::{Author, CommitObject, InMemoryObjectStore, ObjectStoreExt, Snapshot};

    struct Fixture {
        store: InMemoryObjectStore,
        refs: InMemoryRefStore,
        commits: Vec<ObjectId>,
    }

    impl Fixture {
        fn linear(n: usize) -> Self {
            let store = InMemoryObjectStore::new();
            let key = SigningKey::generate();
            let mut commits = Vec::new();
            for i in 0..n {
                let mut snap = Snapshot::new();
                snap.put_file(&store, format!("f{i}"), format!("content {i}").as_bytes())
                    .unwrap();
                let tree = snap.write(&store).unwrap();
                let commit = CommitObject::build(
                    tree,
                    commits.last().copied().into_iter().collect(),
                    Author {
                        name: "a".into(),
                        device: key.fingerprint(),
                    },
                    i as i64 + 1,
                    "{\"type\":\"text/plain\"}".into(),
                    |p| key.sign(p),
                )
                .unwrap();
                commits.push(store.write_commit(&commit).unwrap());
            }
            let refs = InMemoryRefStore::new();
            let main = branch_ref_name(MAIN_BRANCH);
            refs.write_ref(&main, &Ref::branch(MAIN_BRANCH, *commits.last().unwrap()))
                .unwrap();
            Self {
                store,
                refs,
                commits,
            }
        }

        fn server(&self) -> UploadPackServer<'_> {
            UploadPackServer::new("conv", &self.store, &self.refs)
        }
    }

    fn requests(reqs: &[Request]) -> BytesMut {
        let mut buf = BytesMut::new();
        for r in reqs {
            r.encode(&mut buf).unwrap();
        }
        buf
    }

    fn responses(bytes: &[u8]) -> Vec<Response> {
        let mut decoder = PktLineDecoder::new();
        decoder.feed(bytes);
        decoder
            .drain()
            .unwrap()
            .iter()
            .map(|l: &PktLine| Response::decode(l).unwrap())
            .collect()
    }

    fn receive_pack(reply: &[u8]) -> PackReceiver {
        let mut rx = PackReceiver::new(MAX_FETCH_SIZE);
        let mut done = false;
        for resp in responses(reply) {
            done = rx.accept(resp).unwrap();
        }
        assert!(done);
        rx
    }

    #[test]
    fn advertises_head_and_refs() {
        let fx = Fixture::linear(2);
        let mut server = fx.server();
        let out = server
            .receive(&requests(&[Request::upload_pack("conv")]))
            .unwrap();

        let mut adv = Advertisement::default();
        let mut closed = false;
        for resp in responses(&out.reply) {
            closed = adv.accept(resp).unwrap();
        }
        assert!(closed);
        assert_eq!(adv.version, Some(1));
        assert_eq!(adv.head, Some(fx.commits[1]));
        assert_eq!(adv.refs, vec![("refs/heads/main".to_string(), fx.commits[1])]);
        assert!(adv.has_capability("side-band-64k"));
    }

    #[test]
    fn wrong_conversation_is_refused() {
        let fx = Fixture::linear(1);
        let err = fx
            .server()
            .receive(&requests(&[Request::upload_pack("other")]))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownConversation { .. }));
    }

    #[test]
    fn no_common_base_sends_nak_and_everything() {
        let fx = Fixture::linear(3);
        let tip = fx.commits[2];
        let out = fx
            .server()
            .receive(&requests(&[
                Request::want(tip),
                Request::Have(ObjectId::from_bytes(b"unknown")),
                Request::Done,
            ]))
            .unwrap();
        assert_eq!(out.served, Some(tip));

        let replies = responses(&out.reply);
        assert_eq!(replies[0], Response::Nak);
        let rx = receive_pack(&out.reply);
        assert_eq!(rx.common(), None);
        let pack = rx.into_pack();
        let objects = PackReader::new(&pack).unwrap().objects().unwrap();
        assert_eq!(objects.len(), fx.store.len());
    }

    #[test]
    fn common_base_is_acked_and_bounds_the_pack() {
        let fx = Fixture::linear(3);
        let mut server = fx.server();
        let out = server
            .receive(&requests(&[
                Request::want(fx.commits[2]),
                Request::Have(fx.commits[1]),
                Request::Have(fx.commits[0]),
                Request::Flush,
            ]))
            .unwrap();
        assert_eq!(
            responses(&out.reply),
            vec![
                Response::Ack {
                    id: fx.commits[1],
                    status: AckStatus::Continue
                },
                Response::Nak
            ]
        );

        let out = server.receive(&requests(&[Request::Done])).unwrap();
        let rx = receive_pack(&out.reply);
        assert_eq!(rx.common(), Some(fx.commits[1]));
        let pack = rx.into_pack();
        let ids: Vec<ObjectId> = PackReader::new(&pack)
            .unwrap()
            .objects()
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert!(ids.contains(&fx.commits[2]));
        assert!(!ids.contains(&fx.commits[1]));
        assert!(!ids.contains(&fx.commits[0]));
    }

    #[test]
    fn input_split_mid_line() {
        let fx = Fixture::linear(1);
        let wire = requests(&[Request::want(fx.commits[0]), Request::Done]);
        let mut server = fx.server();
        let first = server.receive(&wire[..10]).unwrap();
        assert!(first.reply.is_empty());
        let second = server.receive(&wire[10..]).unwrap();
        assert_eq!(second.served, Some(fx.commits[0]));
    }

    #[test]
    fn small_sideband_chunks() {
        let fx = Fixture::linear(2);
        let mut server = fx.server().with_limits(16, MAX_FETCH_SIZE);
        let out = server
            .receive(&requests(&[Request::want(fx.commits[1]), Request::Done]))
            .unwrap();
        let bands = responses(&out.reply)
            .into_iter()
            .filter(|r| matches!(r, Response::SideBand { .. }))
            .count();
        assert!(bands > 1);
        let pack = receive_pack(&out.reply).into_pack();
        assert!(PackReader::new(&pack).is_ok());
    }

    #[test]
    fn pack_over_the_limit_is_not_sent() {
        let fx = Fixture::linear(2);
        let mut server = fx.server().with_limits(SIDEBAND_MAX_DATA, 10);
        let out = server
            .receive(&requests(&[Request::want(fx.commits[1]), Request::Done]))
            .unwrap();
        assert_eq!(out.served, None);

        let mut rx = PackReceiver::new(MAX_FETCH_SIZE);
        let replies = responses(&out.reply);
        rx.accept(replies[0].clone()).unwrap();
        let err = rx.accept(replies[1].clone()).unwrap_err();
        assert!(matches!(err, ProtocolError::Remote(msg) if msg.starts_with("pack too large")));
    }

    #[test]
    fn unknown_want_and_missing_want() {
        let fx = Fixture::linear(1);
        let err = fx
            .server()
            .receive(&requests(&[Request::want(ObjectId::from_bytes(b"nope"))]))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownWant(_)));

        let err = fx.server().receive(&requests(&[Request::Done])).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingWant));
    }

    #[test]
    fn stray_lines_are_ignored() {
        let fx = Fixture::linear(1);
        let mut buf = BytesMut::new();
        PktLine::data(&b"deepen 1\n"[..]).encode(&mut buf).unwrap();
        let out = fx.server().receive(&buf).unwrap();
        assert!(out.reply.is_empty());
    }
}
