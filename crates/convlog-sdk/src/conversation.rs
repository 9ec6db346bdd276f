//! The conversation context object.
//!
//! A [`Conversation`] binds one account to one conversation's object store
//! and refs. Every local mutation builds a new snapshot from the head,
//! signs a commit over it and advances `refs/heads/main` with a
//! compare-and-swap, so concurrent writers on the same stores serialize on
//! the head instead of overwriting each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use convlog_crypto::Certificate;
use convlog_history::{CommitRecord, Filter, History, LogOptions};
use convlog_membership::paths::{self, PROFILE};
use convlog_membership::{devices, members_at, role_of, DeviceOwnerCache};
use convlog_refs::{branch_ref_name, InMemoryRefStore, Ref, RefError, RefStore, MAIN_BRANCH};
use convlog_store::{
    Author, CommitObject, InMemoryObjectStore, ObjectStore, ObjectStoreExt, Snapshot,
};
use convlog_types::{ConversationMode, Member, MemberRole, ObjectId};
use convlog_validator::{CommitKind, CommitMessage, RootInfo};

use crate::account::Account;
use crate::config::ConversationConfig;
use crate::error::{ConversationError, ConversationResult};
use crate::event::{ConversationEvent, EventBus, EventStream};
use crate::profile;

/// One conversation as seen by one account.
pub struct Conversation {
    pub(crate) id: ObjectId,
    pub(crate) root: RootInfo,
    pub(crate) account: Arc<dyn Account>,
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) refs: Arc<dyn RefStore>,
    pub(crate) cache: Arc<DeviceOwnerCache>,
    pub(crate) config: ConversationConfig,
    pub(crate) events: EventBus,
}

impl Conversation {
    // ---- Lifecycle ----

    /// Start a new conversation in memory.
    ///
    /// A one-to-one conversation needs `other_member`, who is recorded as
    /// invited by the initial commit.
    pub fn create(
        account: Arc<dyn Account>,
        mode: ConversationMode,
        other_member: Option<&str>,
        config: ConversationConfig,
    ) -> ConversationResult<Self> {
        Self::create_in(
            account,
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryRefStore::new()),
            mode,
            other_member,
            config,
        )
    }

    /// Start a new conversation in the given stores, which must be empty.
    pub fn create_in(
        account: Arc<dyn Account>,
        store: Arc<dyn ObjectStore>,
        refs: Arc<dyn RefStore>,
        mode: ConversationMode,
        other_member: Option<&str>,
        config: ConversationConfig,
    ) -> ConversationResult<Self> {
        let uri = account.uri();
        let invited = match (mode, other_member) {
            (ConversationMode::OneToOne, Some(peer)) if peer != uri => Some(peer.to_string()),
            (ConversationMode::OneToOne, _) => {
                return Err(ConversationError::InvalidMode(
                    "a one-to-one conversation needs another member".into(),
                ));
            }
            _ => None,
        };

        let mut snap = Snapshot::new();
        snap.put_file(
            &*store,
            paths::admin_cert(&uri),
            &account.account_certificate().to_bytes(),
        )?;
        snap.put_file(
            &*store,
            paths::device_cert(&account.device_id()),
            &account.device_certificate().to_bytes(),
        )?;
        if let Some(crl) = account.revocation_list() {
            snap.put_file(&*store, paths::crl(&uri), &crl)?;
        }
        if let Some(peer) = &invited {
            snap.put_file(&*store, paths::invited(peer), b"")?;
        }

        let msg = CommitKind::Initial { mode, invited }.to_message();
        let tree = snap.write(&*store)?;
        let id = sign_commit(&*account, &*store, tree, Vec::new(), &msg)?;
        refs.compare_and_swap(&main_ref(), None, &Ref::branch(MAIN_BRANCH, id))?;
        let root = RootInfo::load(&*store, &id)?;
        info!(conversation = %id.short_hex(), %mode, "created conversation");
        Ok(Self::assemble(account, store, refs, root, config))
    }

    /// Open a conversation whose history is already in `store`.
    pub fn open(
        account: Arc<dyn Account>,
        store: Arc<dyn ObjectStore>,
        refs: Arc<dyn RefStore>,
        config: ConversationConfig,
    ) -> ConversationResult<Self> {
        let head = refs.head()?.ok_or(ConversationError::NoHead)?;
        let root = RootInfo::find(&*store, &head)?;
        debug!(conversation = %root.id.short_hex(), head = %head.short_hex(), "opened conversation");
        Ok(Self::assemble(account, store, refs, root, config))
    }

    pub(crate) fn assemble(
        account: Arc<dyn Account>,
        store: Arc<dyn ObjectStore>,
        refs: Arc<dyn RefStore>,
        root: RootInfo,
        config: ConversationConfig,
    ) -> Self {
        Self {
            id: root.id,
            root,
            account,
            store,
            refs,
            cache: Arc::new(DeviceOwnerCache::new()),
            events: EventBus::new(config.event_capacity),
            config,
        }
    }

    /// Drop every object and ref of the conversation.
    pub fn erase(self) -> ConversationResult<()> {
        let objects = self.store.clear()?;
        let refs = self.refs.clear()?;
        self.cache.clear();
        info!(conversation = %self.id.short_hex(), objects, refs, "erased conversation");
        Ok(())
    }

    /// Replace the message of the head commit, keeping its tree and parents.
    pub fn amend(&self, commit: &ObjectId, message: &CommitMessage) -> ConversationResult<ObjectId> {
        let head = self.head()?;
        if *commit != head {
            return Err(ConversationError::NotHead(*commit));
        }
        let old = self.store.read_commit(&head)?;
        let id = sign_commit(&*self.account, &*self.store, old.tree, old.parents, message)?;
        self.advance_head(head, id)?;
        Ok(id)
    }

    // ---- Accessors ----

    /// Conversation id: the id of the root commit.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn mode(&self) -> ConversationMode {
        self.root.mode
    }

    /// The creator, then the invited peer of a one-to-one conversation.
    pub fn initial_members(&self) -> &[String] {
        &self.root.initial_members
    }

    pub fn account(&self) -> &dyn Account {
        &*self.account
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn ObjectStore {
        &*self.store
    }

    pub fn refs(&self) -> &dyn RefStore {
        &*self.refs
    }

    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn head(&self) -> ConversationResult<ObjectId> {
        self.refs.head()?.ok_or(ConversationError::NoHead)
    }

    // ---- Membership queries ----

    pub fn members(&self) -> ConversationResult<Vec<Member>> {
        let (_, snap) = self.head_snapshot()?;
        Ok(members_at(&snap, self.root.mode, &self.root.initial_members))
    }

    /// Uris of every participant whose role is not in `filtered_roles`.
    pub fn member_uris(&self, filtered_roles: &[MemberRole]) -> ConversationResult<Vec<String>> {
        Ok(self
            .members()?
            .into_iter()
            .filter(|m| !filtered_roles.contains(&m.role))
            .map(|m| m.uri)
            .collect())
    }

    pub fn role_of(&self, uri: &str) -> ConversationResult<Option<MemberRole>> {
        let (_, snap) = self.head_snapshot()?;
        Ok(role_of(&snap, uri))
    }

    /// Device certificates at the head, keyed by device id.
    pub fn devices(&self, ignore_expired: bool) -> ConversationResult<BTreeMap<String, Certificate>> {
        let (_, snap) = self.head_snapshot()?;
        let mut result = devices(&*self.store, &snap)?;
        if ignore_expired {
            let now = Utc::now().timestamp();
            result.retain(|_, cert| !cert.is_expired_at(now));
        }
        Ok(result)
    }

    /// Owner of `device`: from the head tree, else from a certificate the
    /// account vouches for.
    pub fn uri_from_device(&self, device: &str) -> ConversationResult<Option<String>> {
        let (_, snap) = self.head_snapshot()?;
        if let Some(uri) = self.cache.owner(&*self.store, &snap, device)? {
            return Ok(Some(uri));
        }
        Ok(self
            .account
            .certificate_for(device)
            .filter(|cert| self.account.is_valid_device(cert))
            .map(|cert| cert.issuer_uid()))
    }

    // ---- Profile ----

    /// Profile keys from `profile.vcf`, plus the conversation mode.
    pub fn infos(&self) -> ConversationResult<BTreeMap<String, String>> {
        let (_, snap) = self.head_snapshot()?;
        let mut infos = self.read_profile(&snap)?;
        infos.insert(profile::MODE.to_string(), self.root.mode.code().to_string());
        Ok(infos)
    }

    /// Merge `infos` into the profile and commit it.
    pub fn update_infos(&self, infos: &BTreeMap<String, String>) -> ConversationResult<ObjectId> {
        let uri = self.account.uri();
        let (head, mut snap) = self.head_snapshot()?;
        let allowed = matches!(
            role_of(&snap, &uri),
            Some(role @ (MemberRole::Admin | MemberRole::Member))
                if role.satisfies(self.config.update_profile_perm_lvl)
        );
        if !allowed {
            return Err(self.report(ConversationError::Unauthorized(uri)));
        }

        let mut current = self.read_profile(&snap)?;
        for (key, value) in infos {
            if profile::is_profile_key(key) {
                current.insert(key.clone(), value.clone());
            }
        }
        self.announce(&mut snap)?;
        snap.put_file(&*self.store, PROFILE, profile::to_vcard(&current).as_bytes())?;
        self.commit(head, &snap, &CommitKind::ProfileUpdate.to_message())
    }

    fn read_profile(&self, snap: &Snapshot) -> ConversationResult<BTreeMap<String, String>> {
        Ok(snap
            .read_file(&*self.store, PROFILE)?
            .map(|data| profile::from_vcard(&String::from_utf8_lossy(&data)))
            .unwrap_or_default())
    }

    // ---- Messages ----

    pub fn send_text(&self, body: &str) -> ConversationResult<ObjectId> {
        self.commit_message(&CommitMessage::text(body))
    }

    /// Replace the body of one of the account's earlier text messages.
    pub fn edit_message(&self, edited: &ObjectId, body: &str) -> ConversationResult<ObjectId> {
        let msg = CommitKind::EditedMessage {
            edit: edited.to_hex(),
        }
        .to_message()
        .with("body", body);
        self.commit_message(&msg)
    }

    /// Commit a content message on top of the head.
    pub fn commit_message(&self, msg: &CommitMessage) -> ConversationResult<ObjectId> {
        let (head, mut snap) = self.head_snapshot()?;
        self.announce(&mut snap)?;
        self.commit(head, &snap, msg)
    }

    // ---- History ----

    pub fn log(&self, opts: &LogOptions) -> ConversationResult<Vec<CommitRecord>> {
        let head = self.head()?;
        Ok(History::new(&*self.store, &self.cache).log(&head, opts)?)
    }

    pub fn search(&self, filter: &Filter) -> ConversationResult<Vec<CommitRecord>> {
        let head = self.head()?;
        Ok(History::new(&*self.store, &self.cache).search(&head, filter)?)
    }

    // ---- Plumbing ----

    pub(crate) fn head_snapshot(&self) -> ConversationResult<(ObjectId, Snapshot)> {
        let head = self.head()?;
        let commit = self.store.read_commit(&head)?;
        Ok((head, Snapshot::load(&*self.store, &commit.tree)?))
    }

    /// Add the local device certificate to `snap` if it is missing.
    pub(crate) fn announce(&self, snap: &mut Snapshot) -> ConversationResult<()> {
        let path = paths::device_cert(&self.account.device_id());
        if !snap.contains(&path) {
            let cert = self.account.device_certificate().to_bytes();
            snap.put_file(&*self.store, path, &cert)?;
        }
        Ok(())
    }

    /// Sign `snap` as a child of `parent` and make it the head.
    pub(crate) fn commit(
        &self,
        parent: ObjectId,
        snap: &Snapshot,
        msg: &CommitMessage,
    ) -> ConversationResult<ObjectId> {
        let tree = snap.write(&*self.store)?;
        let id = sign_commit(&*self.account, &*self.store, tree, vec![parent], msg)?;
        self.advance_head(parent, id)?;
        Ok(id)
    }

    pub(crate) fn advance_head(&self, expected: ObjectId, new: ObjectId) -> ConversationResult<()> {
        self.refs
            .compare_and_swap(&main_ref(), Some(expected), &Ref::branch(MAIN_BRANCH, new))
            .map_err(|e| match e {
                RefError::Stale { .. } => ConversationError::Concurrent,
                other => other.into(),
            })?;
        info!(
            conversation = %self.id.short_hex(),
            commit = %new.short_hex(),
            "head advanced"
        );
        self.events.emit(ConversationEvent::HeadMoved {
            conversation: self.id.to_hex(),
            head: new,
        });
        Ok(())
    }

    /// Log `err` and signal it to subscribers.
    pub(crate) fn report(&self, err: ConversationError) -> ConversationError {
        let kind = err.kind();
        warn!(conversation = %self.id.short_hex(), %kind, error = %err, "conversation error");
        self.events.emit(ConversationEvent::Error {
            conversation: self.id.to_hex(),
            kind,
            detail: err.to_string(),
        });
        err
    }
}

pub(crate) fn main_ref() -> String {
    branch_ref_name(MAIN_BRANCH)
}

/// Sign and store a commit authored by the account's device.
pub(crate) fn sign_commit(
    account: &dyn Account,
    store: &dyn ObjectStore,
    tree: ObjectId,
    parents: Vec<ObjectId>,
    msg: &CommitMessage,
) -> ConversationResult<ObjectId> {
    let author = Author {
        name: account.display_name(),
        device: account.device_id(),
    };
    let commit = CommitObject::build(
        tree,
        parents,
        author,
        Utc::now().timestamp(),
        msg.to_json(),
        |payload| account.sign(payload),
    )?;
    Ok(store.write_commit(&commit)?)
}
