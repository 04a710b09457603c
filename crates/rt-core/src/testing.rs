//! Test doubles shared by the unit tests: an in-memory object store, a
//! scripted engine, a fake cloud and a scripted prompter, plus a session
//! harness wiring them together.

use crate::aws::sts::Identity;
use crate::backend::object::{ObjectStore, ObjectStoreBackend, ACL, CONTENT_TYPE};
use crate::commands::Session;
use crate::error::{Result, RtError};
use crate::prompt::{Prompter, Tone};
use crate::store::DeploymentState;
use crate::terraform::engine::{Engine, RawOutput};
use crate::terraform::{Driver, RemoteState};
use crate::traffic::{Balancer, Cloud, InstanceHealth, Reservation};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    objects: BTreeMap<String, (Vec<u8>, String, String)>,
    fail_writes: bool,
}

/// Object store in a shared map; clones see the same objects.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().objects.contains_key(key)
    }

    pub fn insert(&self, key: &str, body: &[u8]) {
        self.lock().objects.insert(
            key.to_string(),
            (body.to_vec(), CONTENT_TYPE.to_string(), ACL.to_string()),
        );
    }

    /// `(content type, acl)` of a stored object.
    pub fn metadata(&self, key: &str) -> Option<(String, String)> {
        self.lock()
            .objects
            .get(key)
            .map(|(_, ct, acl)| (ct.clone(), acl.clone()))
    }

    pub fn fail_writes(&self) {
        self.lock().fail_writes = true;
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().objects.get(key).map(|(body, _, _)| body.clone()))
    }

    fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        if self.lock().fail_writes {
            return Err(RtError::Backend("write refused".into()));
        }
        self.insert(key, body);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(RtError::Backend("delete refused".into()));
        }
        inner.objects.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// A deployment state over one memory backend named `memory`, prefix `dev`.
pub fn memory_state() -> (DeploymentState, MemoryStore) {
    let store = MemoryStore::default();
    let state = DeploymentState::from_backends(vec![Box::new(ObjectStoreBackend::new(
        "memory",
        "dev",
        store.clone(),
    ))])
    .unwrap();
    (state, store)
}

// ---------------------------------------------------------------------------
// FakeEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCall {
    pub subcommand: String,
    pub args: Vec<String>,
    pub dir: PathBuf,
}

#[derive(Default)]
struct EngineInner {
    scripted: HashMap<String, VecDeque<RawOutput>>,
    calls: Vec<EngineCall>,
}

/// Engine answering from per-subcommand scripts. Unscripted calls succeed
/// with no output, except `version`.
#[derive(Clone, Default)]
pub struct FakeEngine {
    inner: Arc<Mutex<EngineInner>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, subcommand: &str, exit_code: i32, stdout: &str, stderr: &str) {
        self.inner
            .lock()
            .unwrap()
            .scripted
            .entry(subcommand.to_string())
            .or_default()
            .push_back(RawOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            });
    }

    pub fn push_stdout(&self, subcommand: &str, stdout: &str) {
        self.push(subcommand, 0, stdout, "");
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner.lock().unwrap().calls.clone()
    }
}

impl Engine for FakeEngine {
    fn run(
        &self,
        subcommand: &str,
        args: &[String],
        dir: &Path,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<RawOutput> {
        let out = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(EngineCall {
                subcommand: subcommand.to_string(),
                args: args.to_vec(),
                dir: dir.to_path_buf(),
            });
            let next = inner
                .scripted
                .get_mut(subcommand)
                .and_then(VecDeque::pop_front);
            match next {
                Some(out) => out,
                None if subcommand == "version" => RawOutput {
                    stdout: "Terraform v0.7.13\n".into(),
                    ..Default::default()
                },
                None => RawOutput::default(),
            }
        };
        stdout.write_all(out.stdout.as_bytes())?;
        stderr.write_all(out.stderr.as_bytes())?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// FakeCloud
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CloudInner {
    /// `(Name tag, group id)`.
    groups: Vec<(String, String)>,
    group_instances: BTreeMap<String, Vec<String>>,
    attached: BTreeMap<String, Vec<String>>,
    /// `(balancer, App tag)`.
    balancers: Vec<(String, String)>,
    health: BTreeMap<String, Vec<InstanceHealth>>,
    reservations: Vec<Reservation>,
    tag_batches: Vec<usize>,
    detach_error: Option<RtError>,
    detached: Vec<(String, Vec<String>)>,
}

/// In-memory scaling groups and classic load balancers in `us-east-1`.
#[derive(Clone, Default)]
pub struct FakeCloud {
    inner: Rc<RefCell<CloudInner>>,
}

impl FakeCloud {
    pub fn add_group(&self, name_tag: &str, id: &str) {
        self.inner
            .borrow_mut()
            .groups
            .push((name_tag.to_string(), id.to_string()));
    }

    pub fn add_instances(&self, group: &str, ids: &[&str]) {
        self.inner
            .borrow_mut()
            .group_instances
            .entry(group.to_string())
            .or_default()
            .extend(ids.iter().map(|id| id.to_string()));
    }

    pub fn add_balancer(&self, name: &str, app_tag: &str) {
        self.inner
            .borrow_mut()
            .balancers
            .push((name.to_string(), app_tag.to_string()));
    }

    pub fn set_health(&self, balancer: &str, instances: &[(&str, &str)]) {
        let health = instances
            .iter()
            .map(|(id, state)| InstanceHealth {
                instance_id: id.to_string(),
                state: state.to_string(),
            })
            .collect();
        self.inner
            .borrow_mut()
            .health
            .insert(balancer.to_string(), health);
    }

    pub fn add_reservation(&self, instances: &[(&str, &str)]) {
        self.inner.borrow_mut().reservations.push(Reservation {
            instances: instances
                .iter()
                .map(|(id, ip)| (id.to_string(), ip.to_string()))
                .collect(),
        });
    }

    /// Attach without recording a call.
    pub fn attach(&self, group: &str, balancer: &str) {
        let mut inner = self.inner.borrow_mut();
        let list = inner.attached.entry(group.to_string()).or_default();
        if !list.iter().any(|b| b == balancer) {
            list.push(balancer.to_string());
        }
    }

    pub fn attached_to(&self, group: &str) -> Vec<String> {
        self.inner
            .borrow()
            .attached
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    pub fn detached(&self) -> Vec<(String, Vec<String>)> {
        self.inner.borrow().detached.clone()
    }

    pub fn tag_batches(&self) -> Vec<usize> {
        self.inner.borrow().tag_batches.clone()
    }

    /// Make the next detach fail with `err`.
    pub fn fail_detach(&self, err: RtError) {
        self.inner.borrow_mut().detach_error = Some(err);
    }
}

impl Cloud for FakeCloud {
    fn region(&self) -> &str {
        "us-east-1"
    }

    fn scaling_group_ids_by_tag(&self, key: &str, value: &str) -> Result<Vec<String>> {
        if key != "Name" {
            return Ok(Vec::new());
        }
        Ok(self
            .inner
            .borrow()
            .groups
            .iter()
            .filter(|(tag, _)| tag == value)
            .map(|(_, id)| id.clone())
            .collect())
    }

    fn scaling_group_instance_ids(&self, group: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .borrow()
            .group_instances
            .get(group)
            .cloned()
            .unwrap_or_default())
    }

    fn scaling_group_balancers(&self, group: &str) -> Result<Vec<Balancer>> {
        Ok(self
            .attached_to(group)
            .into_iter()
            .map(|name| Balancer {
                name,
                state: "InService".into(),
            })
            .collect())
    }

    fn load_balancer_names(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .borrow()
            .balancers
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn load_balancer_tags(
        &self,
        names: &[String],
    ) -> Result<Vec<(String, BTreeMap<String, String>)>> {
        let mut inner = self.inner.borrow_mut();
        inner.tag_batches.push(names.len());
        Ok(inner
            .balancers
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(name, app)| {
                let mut tags = BTreeMap::new();
                tags.insert("App".to_string(), app.clone());
                (name.clone(), tags)
            })
            .collect())
    }

    fn instance_health(&self, balancer: &str) -> Result<Vec<InstanceHealth>> {
        Ok(self
            .inner
            .borrow()
            .health
            .get(balancer)
            .cloned()
            .unwrap_or_default())
    }

    fn attach_load_balancers(&self, group: &str, balancers: &[String]) -> Result<()> {
        for b in balancers {
            self.attach(group, b);
        }
        Ok(())
    }

    fn detach_load_balancers(&self, group: &str, balancers: &[String]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if let Some(err) = inner.detach_error.take() {
            return Err(err);
        }
        inner
            .detached
            .push((group.to_string(), balancers.to_vec()));
        if let Some(list) = inner.attached.get_mut(group) {
            list.retain(|b| !balancers.contains(b));
        }
        Ok(())
    }

    fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<Reservation>> {
        Ok(self
            .inner
            .borrow()
            .reservations
            .iter()
            .filter(|r| {
                instance_ids.is_empty()
                    || r.instances.iter().any(|(id, _)| instance_ids.contains(id))
            })
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// ScriptedPrompter
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PrompterInner {
    confirms: VecDeque<bool>,
    answers: VecDeque<String>,
    notes: Vec<String>,
    questions: Vec<String>,
    said: Vec<(Tone, String)>,
}

/// Answers from scripts and records everything shown. Unscripted
/// confirmations say yes; an unscripted question is an error.
#[derive(Clone, Default)]
pub struct ScriptedPrompter {
    inner: Arc<Mutex<PrompterInner>>,
}

impl ScriptedPrompter {
    pub fn confirms(self, answers: &[bool]) -> Self {
        self.inner
            .lock()
            .unwrap()
            .confirms
            .extend(answers.iter().copied());
        self
    }

    pub fn answers(self, answers: &[&str]) -> Self {
        self.inner
            .lock()
            .unwrap()
            .answers
            .extend(answers.iter().map(|a| a.to_string()));
        self
    }

    pub fn notes(&self) -> Vec<String> {
        self.inner.lock().unwrap().notes.clone()
    }

    pub fn questions(&self) -> Vec<String> {
        self.inner.lock().unwrap().questions.clone()
    }

    pub fn said(&self) -> Vec<(Tone, String)> {
        self.inner.lock().unwrap().said.clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, note: &str, _sensitive: bool) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.notes.push(note.to_string());
        Ok(inner.confirms.pop_front().unwrap_or(true))
    }

    fn ask(&self, question: &str, default: &str) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.questions.push(question.to_string());
        let answer = inner
            .answers
            .pop_front()
            .ok_or_else(|| RtError::Usage(format!("no scripted answer for {question:?}")))?;
        if answer.trim().is_empty() {
            return Ok(default.to_string());
        }
        Ok(answer)
    }

    fn say(&self, tone: Tone, message: &str) {
        self.inner
            .lock()
            .unwrap()
            .said
            .push((tone, message.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub session: Session,
    /// Working directory of the session.
    pub dir: TempDir,
    pub memory: MemoryStore,
    pub engine: FakeEngine,
    pub prompter: ScriptedPrompter,
    pub cloud: FakeCloud,
}

pub fn s3_remote_state() -> RemoteState {
    let mut config = BTreeMap::new();
    config.insert("bucket".to_string(), "tfstate".to_string());
    config.insert("region".to_string(), "us-east-1".to_string());
    RemoteState {
        backend: "s3".into(),
        config,
    }
}

/// Session for app `hello` in env `dev`, called by account `123456789012`.
pub fn harness(prompter: ScriptedPrompter) -> Harness {
    let dir = TempDir::new().unwrap();
    let (store, memory) = memory_state();
    let engine = FakeEngine::new();
    let cloud = FakeCloud::default();
    let identity = Identity {
        arn: "arn:aws:iam::123456789012:user/op".into(),
        user_id: "AIDAEXAMPLE".into(),
        account_id: "123456789012".into(),
        name: "op".into(),
    };
    let session = Session::new(
        "dev",
        "hello",
        store,
        Driver::new(Box::new(engine.clone())),
        Box::new(prompter.clone()),
    )
    .with_identity(identity, Some("8.8.8.8".into()))
    .with_remote_state(s3_remote_state())
    .with_cloud(Box::new(cloud.clone()))
    .with_cwd(dir.path().to_path_buf());
    Harness {
        session,
        dir,
        memory,
        engine,
        prompter,
        cloud,
    }
}
