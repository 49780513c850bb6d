// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! The aggregate manager service: the nine AM API v3 methods.
//!
//! Every method takes typed arguments and returns a populated reply carrying
//! a GENI return code; transport failures are the adapter's business, not
//! ours. Nothing here caches authorization or status between calls.

mod lifecycle;
mod provision;

use std::collections::BTreeMap;
use std::future::Future;
use std::io::Write as _;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use federa_core::credential::Credential;
use federa_core::error::{FederaError, FederaResult};
use federa_core::geni::{
    self, AllocationState, Code, OperationalState, ACTION_START, ACTION_UPDATE_USERS,
    ALLOCATE_MANY, CREDENTIAL_TYPE_SFA, CREDENTIAL_VERSION_SFA, RSPEC_NAMESPACE, RSPEC_SCHEMA_AD,
    RSPEC_SCHEMA_REQUEST, SINGLE_ALLOCATION,
};
use federa_core::identifier::{Identifier, ResourceType};
use federa_core::naming;
use federa_core::rspec::{Location, Node, Rspec, SliverType, TYPE_ADVERTISEMENT, TYPE_MANIFEST};

use crate::auth::{Authorizer, Caller};
use crate::config::Config;
use crate::store::{
    Kind, KeyMaterialSpec, LabelSelector, NodeSpec, Object, ObjectStore, SliverSpec, Spec,
    StoreError,
};

/// The only sliver type this manager offers.
pub const SLIVER_TYPE_CONTAINER: &str = "container";

// ---------------------------------------------------------------------------
// Wire types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyCode {
    pub geni_code: i32,
}

/// The AM API reply envelope. Errors are data, not transport failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply<T> {
    pub code: ReplyCode,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    pub value: T,
}

impl<T> Reply<T> {
    pub fn success(value: T) -> Self {
        Reply {
            code: ReplyCode {
                geni_code: Code::Success.geni_code(),
            },
            output: String::new(),
            value,
        }
    }
}

impl<T: Default> Reply<T> {
    pub fn failure(error: &FederaError) -> Self {
        Reply {
            code: ReplyCode {
                geni_code: error.code().geni_code(),
            },
            output: error.to_string(),
            value: T::default(),
        }
    }
}

/// The option bag shared by all methods; unknown options are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub geni_available: bool,
    pub geni_compressed: bool,
    pub geni_best_effort: bool,
    pub geni_end_time: Option<String>,
    pub geni_rspec_version: Option<RspecVersion>,
    pub geni_users: Vec<GeniUser>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RspecVersion {
    #[serde(rename = "type")]
    pub version_type: String,
    pub version: String,
    pub schema: String,
    pub namespace: String,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeniUser {
    pub urn: String,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SliverInfo {
    pub geni_sliver_urn: String,
    pub geni_expires: String,
    pub geni_allocation_status: String,
    pub geni_operational_status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub geni_error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialTypeInfo {
    pub geni_type: String,
    pub geni_version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionValue {
    pub urn: String,
    pub geni_api: i32,
    pub geni_api_versions: BTreeMap<String, String>,
    pub geni_request_rspec_versions: Vec<RspecVersion>,
    pub geni_ad_rspec_versions: Vec<RspecVersion>,
    pub geni_credential_types: Vec<CredentialTypeInfo>,
    pub geni_single_allocation: i32,
    pub geni_allocate: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestValue {
    pub geni_rspec: String,
    pub geni_slivers: Vec<SliverInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusValue {
    pub geni_urn: String,
    pub geni_slivers: Vec<SliverInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescribeValue {
    pub geni_urn: String,
    pub geni_rspec: String,
    pub geni_slivers: Vec<SliverInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListResourcesArgs {
    pub credentials: Vec<Credential>,
    pub options: Options,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocateArgs {
    pub slice_urn: String,
    pub credentials: Vec<Credential>,
    pub rspec: String,
    pub options: Options,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenewArgs {
    pub urns: Vec<String>,
    pub credentials: Vec<Credential>,
    pub expiration_time: String,
    pub options: Options,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SliverSetArgs {
    pub urns: Vec<String>,
    pub credentials: Vec<Credential>,
    pub options: Options,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformOperationalActionArgs {
    pub urns: Vec<String>,
    pub credentials: Vec<Credential>,
    pub action: String,
    pub options: Options,
}

// ---------------------------------------------------------------------------
// Service

struct Inner {
    config: Config,
    store: Arc<dyn ObjectStore>,
    authorizer: Authorizer,
}

#[derive(Clone)]
pub struct AmService {
    inner: Arc<Inner>,
}

impl AmService {
    pub fn new(config: Config, store: Arc<dyn ObjectStore>, authorizer: Authorizer) -> Self {
        AmService {
            inner: Arc::new(Inner {
                config,
                store,
                authorizer,
            }),
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.inner.store
    }

    fn authorizer(&self) -> &Authorizer {
        &self.inner.authorizer
    }

    /// Every store call is bounded; a hung store answers like a failed one.
    pub(crate) async fn store_call<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.inner.config.store_timeout, fut)
            .await
            .unwrap_or(Err(StoreError::Timeout))
    }

    fn reply<T: Default>(&self, method: &'static str, result: FederaResult<T>) -> Reply<T> {
        match result {
            Ok(value) => Reply::success(value),
            Err(error) => {
                tracing::warn!(method, code = error.code().geni_code(), error = %error, "request failed");
                Reply::failure(&error)
            }
        }
    }

    // -- GetVersion ---------------------------------------------------------

    pub async fn get_version(&self) -> Reply<VersionValue> {
        let config = self.config();
        let geni_version = |schema: &str| RspecVersion {
            version_type: "geni".to_string(),
            version: "3".to_string(),
            schema: schema.to_string(),
            namespace: RSPEC_NAMESPACE.to_string(),
            extensions: Vec::new(),
        };
        let mut api_versions = BTreeMap::new();
        api_versions.insert("3".to_string(), config.absolute_url.clone());
        Reply::success(VersionValue {
            urn: config.component_manager_urn().urn(),
            geni_api: 3,
            geni_api_versions: api_versions,
            geni_request_rspec_versions: vec![geni_version(RSPEC_SCHEMA_REQUEST)],
            geni_ad_rspec_versions: vec![geni_version(RSPEC_SCHEMA_AD)],
            geni_credential_types: vec![CredentialTypeInfo {
                geni_type: CREDENTIAL_TYPE_SFA.to_string(),
                geni_version: CREDENTIAL_VERSION_SFA.to_string(),
            }],
            geni_single_allocation: SINGLE_ALLOCATION,
            geni_allocate: ALLOCATE_MANY.to_string(),
        })
    }

    // -- ListResources ------------------------------------------------------

    pub async fn list_resources(&self, caller: &Caller, args: ListResourcesArgs) -> Reply<String> {
        let result = self.list_resources_impl(caller, args).await;
        self.reply("ListResources", result)
    }

    async fn list_resources_impl(
        &self,
        caller: &Caller,
        args: ListResourcesArgs,
    ) -> FederaResult<String> {
        self.authorizer()
            .find_credential(&caller.user, None, &args.credentials)?;
        check_rspec_version(args.options.geni_rspec_version.as_ref())?;

        let nodes = self
            .store_call(self.store().list(Kind::Node, None))
            .await
            .map_err(|e| FederaError::server("failed to list nodes", e))?;

        let mut advertisement = Rspec::new(TYPE_ADVERTISEMENT);
        for object in &nodes {
            let Some(spec) = object.as_node() else { continue };
            if args.options.geni_available && !spec.ready {
                continue;
            }
            advertisement
                .nodes
                .push(self.advertisement_node(&object.meta.name, spec));
        }

        let xml = advertisement.to_xml();
        if args.options.geni_compressed {
            compress_zlib_base64(&xml)
        } else {
            Ok(xml)
        }
    }

    fn advertisement_node(&self, name: &str, spec: &NodeSpec) -> Node {
        let config = self.config();
        let disk_images = config
            .images
            .keys()
            .map(|short| config.urn(ResourceType::Image, short.clone()).urn())
            .collect();
        Node {
            component_id: config.urn(ResourceType::Node, name).urn(),
            component_manager_id: config.component_manager_urn().urn(),
            component_name: name.to_string(),
            exclusive: false,
            hardware_type: Some(format!("kubernetes-{}", spec.arch)),
            available: Some(spec.ready),
            location: node_location(spec),
            sliver_types: vec![SliverType {
                name: SLIVER_TYPE_CONTAINER.to_string(),
                disk_images,
            }],
            ..Node::default()
        }
    }

    // -- Allocate -----------------------------------------------------------

    pub async fn allocate(&self, caller: &Caller, args: AllocateArgs) -> Reply<ManifestValue> {
        let result = self.allocate_impl(caller, args).await;
        self.reply("Allocate", result)
    }

    async fn allocate_impl(
        &self,
        caller: &Caller,
        args: AllocateArgs,
    ) -> FederaResult<ManifestValue> {
        let slice = Identifier::parse(&args.slice_urn)?;
        slice.expect_type(ResourceType::Slice)?;
        self.authorizer()
            .find_credential(&caller.user, Some(&slice), &args.credentials)?;

        let request = Rspec::from_xml(&args.rspec)?;
        if request.nodes.is_empty() {
            return Err(FederaError::BadArguments("request rspec has no nodes".into()));
        }
        let expires = self.allocation_expiry(args.options.geni_end_time.as_deref())?;
        let slice_hash = naming::slice_hash(&slice)?;

        // Validate every unit before creating any.
        let mut pending = Vec::with_capacity(request.nodes.len());
        for node in &request.nodes {
            pending.push(self.allocation_unit(&slice, &slice_hash, node, &caller.user, expires)?);
        }

        // Names are deterministic, so re-sending a request converges on the
        // records that already exist.
        let mut created: Vec<String> = Vec::new();
        let mut slivers: Vec<Object> = Vec::new();
        for object in pending {
            let name = object.meta.name.clone();
            match self.store_call(self.store().create(object)).await {
                Ok(o) => {
                    created.push(name);
                    slivers.push(o);
                }
                Err(StoreError::AlreadyExists(..)) => {
                    match self.store_call(self.store().get(Kind::Sliver, &name)).await {
                        Ok(o) => slivers.push(o),
                        Err(e) => {
                            self.undo_allocations(&created).await;
                            return Err(FederaError::server("failed to get sliver", e));
                        }
                    }
                }
                Err(e) => {
                    self.undo_allocations(&created).await;
                    return Err(FederaError::server("failed to create sliver", e));
                }
            }
        }

        self.manifest_value(&slivers).await
    }

    fn allocation_unit(
        &self,
        slice: &Identifier,
        slice_hash: &str,
        node: &Node,
        user: &Identifier,
        expires: DateTime<Utc>,
    ) -> FederaResult<Object> {
        let unit = |message: String| FederaError::BadArguments(message);
        if node.client_id.is_empty() {
            return Err(unit("node without client_id".into()));
        }
        let client_id = &node.client_id;
        if node.exclusive {
            return Err(unit(format!("node {client_id}: exclusive nodes are not offered")));
        }
        let [sliver_type] = node.sliver_types.as_slice() else {
            return Err(unit(format!("node {client_id}: exactly one sliver_type required")));
        };
        if sliver_type.name != SLIVER_TYPE_CONTAINER {
            return Err(unit(format!(
                "node {client_id}: unknown sliver type {:?}",
                sliver_type.name
            )));
        }
        let image_short = match sliver_type.disk_images.as_slice() {
            [] => None,
            [one] => {
                let image = Identifier::parse(one)?;
                image.expect_type(ResourceType::Image)?;
                Some(image.resource_name)
            }
            _ => {
                return Err(unit(format!("node {client_id}: at most one disk_image allowed")));
            }
        };
        let image = self
            .config()
            .resolve_image(image_short.as_deref())
            .ok_or_else(|| unit(format!("node {client_id}: unknown disk image")))?
            .to_string();

        let requested_node = if node.component_id.is_empty() {
            None
        } else {
            let component = Identifier::parse(&node.component_id)?;
            component.expect_type(ResourceType::Node)?;
            Some(component.resource_name)
        };
        let requested_arch = node
            .hardware_type
            .as_deref()
            .and_then(|h| h.strip_prefix("kubernetes-"))
            .map(str::to_string);

        let name = naming::sliver_name(slice, client_id)?;
        let urn = self.config().urn(ResourceType::Sliver, name.clone());

        let mut labels = BTreeMap::new();
        labels.insert(geni::LABEL_SLICE_HASH.to_string(), slice_hash.to_string());
        labels.insert(geni::LABEL_SLIVER_NAME.to_string(), name.clone());
        labels.insert(geni::LABEL_CLIENT_ID.to_string(), client_id.clone());
        labels.insert(
            geni::LABEL_EXPIRES.to_string(),
            expires.timestamp().to_string(),
        );

        Ok(Object::new(
            name,
            labels,
            Spec::Sliver(SliverSpec {
                urn: urn.urn(),
                slice_urn: slice.urn(),
                user_urn: user.urn(),
                client_id: client_id.clone(),
                expires,
                image,
                requested_arch,
                requested_node,
            }),
        ))
    }

    fn allocation_expiry(&self, end_time: Option<&str>) -> FederaResult<DateTime<Utc>> {
        let lifetime = chrono::Duration::from_std(self.config().default_sliver_lifetime)
            .map_err(|e| FederaError::server("invalid sliver lifetime", e))?;
        let cap = Utc::now() + lifetime;
        match end_time {
            None => Ok(cap),
            Some(t) => Ok(parse_time(t)?.min(cap)),
        }
    }

    async fn undo_allocations(&self, names: &[String]) {
        for name in names {
            match self.store_call(self.store().delete(Kind::Sliver, name)).await {
                Ok(()) | Err(StoreError::NotFound(..)) => {}
                Err(e) => {
                    tracing::error!(sliver = %name, error = %e, "failed to undo allocation")
                }
            }
        }
    }

    // -- Renew --------------------------------------------------------------

    pub async fn renew(&self, caller: &Caller, args: RenewArgs) -> Reply<Vec<SliverInfo>> {
        let result = self.renew_impl(caller, args).await;
        self.reply("Renew", result)
    }

    async fn renew_impl(&self, caller: &Caller, args: RenewArgs) -> FederaResult<Vec<SliverInfo>> {
        let slivers = self
            .authorize_and_list_slivers(caller, &args.urns, &args.credentials)
            .await?;
        let expires = parse_time(&args.expiration_time)?;

        // Expired slivers stay expired: check all before touching any.
        let now = Utc::now();
        for object in &slivers {
            let spec = sliver_spec(object)?;
            if spec.expires <= now {
                return Err(FederaError::SliverExpired(spec.urn.clone()));
            }
        }

        let mut infos = Vec::with_capacity(slivers.len());
        for mut object in slivers {
            let name = object.meta.name.clone();
            if let Spec::Sliver(spec) = &mut object.spec {
                spec.expires = expires;
            }
            object
                .meta
                .labels
                .insert(geni::LABEL_EXPIRES.to_string(), expires.timestamp().to_string());
            self.store_call(self.store().update(object))
                .await
                .map_err(|e| FederaError::server("failed to update sliver", e))?;
            infos.push(self.sliver_info(&name).await?);
        }
        Ok(infos)
    }

    // -- Provision ----------------------------------------------------------

    pub async fn provision(&self, caller: &Caller, args: SliverSetArgs) -> Reply<ManifestValue> {
        let result = self.provision_impl(caller, args).await;
        self.reply("Provision", result)
    }

    async fn provision_impl(
        &self,
        caller: &Caller,
        args: SliverSetArgs,
    ) -> FederaResult<ManifestValue> {
        let slivers = self
            .authorize_and_list_slivers(caller, &args.urns, &args.credentials)
            .await?;
        let authorized_keys = collect_keys(&args.options.geni_users);

        let mut steps = Vec::new();
        for object in &slivers {
            let spec = sliver_spec(object)?;
            steps.extend(provision::backing_resources(
                self.config(),
                object,
                spec,
                &authorized_keys,
            ));
        }
        provision::execute(
            self.store().clone(),
            self.config().store_timeout,
            steps,
        )
        .await?;

        self.manifest_value(&slivers).await
    }

    // -- Status / Describe --------------------------------------------------

    pub async fn status(&self, caller: &Caller, args: SliverSetArgs) -> Reply<StatusValue> {
        let result = self.status_impl(caller, args).await;
        self.reply("Status", result)
    }

    async fn status_impl(&self, caller: &Caller, args: SliverSetArgs) -> FederaResult<StatusValue> {
        let slivers = self
            .authorize_and_list_slivers(caller, &args.urns, &args.credentials)
            .await?;
        let geni_urn = enclosing_slice_urn(&slivers)?;
        let mut infos = Vec::with_capacity(slivers.len());
        for object in &slivers {
            infos.push(self.sliver_info(&object.meta.name).await?);
        }
        Ok(StatusValue {
            geni_urn,
            geni_slivers: infos,
        })
    }

    pub async fn describe(&self, caller: &Caller, args: SliverSetArgs) -> Reply<DescribeValue> {
        let result = self.describe_impl(caller, args).await;
        self.reply("Describe", result)
    }

    async fn describe_impl(
        &self,
        caller: &Caller,
        args: SliverSetArgs,
    ) -> FederaResult<DescribeValue> {
        let slivers = self
            .authorize_and_list_slivers(caller, &args.urns, &args.credentials)
            .await?;
        let geni_urn = enclosing_slice_urn(&slivers)?;
        let manifest = self.manifest_value(&slivers).await?;
        Ok(DescribeValue {
            geni_urn,
            geni_rspec: manifest.geni_rspec,
            geni_slivers: manifest.geni_slivers,
        })
    }

    // -- PerformOperationalAction -------------------------------------------

    pub async fn perform_operational_action(
        &self,
        caller: &Caller,
        args: PerformOperationalActionArgs,
    ) -> Reply<Vec<SliverInfo>> {
        let result = self.perform_operational_action_impl(caller, args).await;
        self.reply("PerformOperationalAction", result)
    }

    async fn perform_operational_action_impl(
        &self,
        caller: &Caller,
        args: PerformOperationalActionArgs,
    ) -> FederaResult<Vec<SliverInfo>> {
        let slivers = self
            .authorize_and_list_slivers(caller, &args.urns, &args.credentials)
            .await?;
        match args.action.as_str() {
            // Provisioned slivers are already running; start re-reports.
            ACTION_START => {}
            ACTION_UPDATE_USERS => {
                let authorized_keys = collect_keys(&args.options.geni_users);
                for object in &slivers {
                    self.update_users(&object.meta.name, &authorized_keys).await?;
                }
            }
            other => return Err(FederaError::UnsupportedAction(other.to_string())),
        }
        let mut infos = Vec::with_capacity(slivers.len());
        for object in &slivers {
            infos.push(self.sliver_info(&object.meta.name).await?);
        }
        Ok(infos)
    }

    /// Rewrites the key material, then deletes the sliver's running pods.
    /// Mounted key material is fixed at pod start, so a restart is the only
    /// way to make the new keys effective.
    async fn update_users(&self, name: &str, authorized_keys: &str) -> FederaResult<()> {
        let material = match self.store_call(self.store().get(Kind::KeyMaterial, name)).await {
            Ok(o) => o,
            // Not provisioned yet; Provision will install the keys it is given.
            Err(StoreError::NotFound(..)) => return Ok(()),
            Err(e) => return Err(FederaError::server("failed to get key material", e)),
        };
        let mut updated = material;
        updated.spec = Spec::KeyMaterial(KeyMaterialSpec {
            authorized_keys: authorized_keys.to_string(),
        });
        self.store_call(self.store().update(updated))
            .await
            .map_err(|e| FederaError::server("failed to update key material", e))?;

        let selector = LabelSelector::new(geni::LABEL_SLIVER_NAME, name);
        let pods = self
            .store_call(self.store().list(Kind::Pod, Some(&selector)))
            .await
            .map_err(|e| FederaError::server("failed to list pods", e))?;
        for pod in pods {
            match self
                .store_call(self.store().delete(Kind::Pod, &pod.meta.name))
                .await
            {
                Ok(()) | Err(StoreError::NotFound(..)) => {}
                Err(e) => return Err(FederaError::server("failed to delete pod", e)),
            }
        }
        Ok(())
    }

    // -- Delete -------------------------------------------------------------

    pub async fn delete(&self, caller: &Caller, args: SliverSetArgs) -> Reply<Vec<SliverInfo>> {
        let result = self.delete_impl(caller, args).await;
        self.reply("Delete", result)
    }

    async fn delete_impl(
        &self,
        caller: &Caller,
        args: SliverSetArgs,
    ) -> FederaResult<Vec<SliverInfo>> {
        let slivers = self
            .authorize_and_list_slivers(caller, &args.urns, &args.credentials)
            .await?;
        let mut infos = Vec::with_capacity(slivers.len());
        for object in &slivers {
            let spec = sliver_spec(object)?;
            match self
                .store_call(self.store().delete(Kind::Sliver, &object.meta.name))
                .await
            {
                // The cascade takes the backing triple with the record.
                Ok(()) | Err(StoreError::NotFound(..)) => {}
                Err(e) => return Err(FederaError::server("failed to delete sliver", e)),
            }
            infos.push(SliverInfo {
                geni_sliver_urn: spec.urn.clone(),
                geni_expires: rfc3339(&spec.expires),
                geni_allocation_status: AllocationState::Unallocated.as_str().to_string(),
                geni_operational_status: OperationalState::NotReady.as_str().to_string(),
                geni_error: String::new(),
            });
        }
        Ok(infos)
    }

    // -- Shared -------------------------------------------------------------

    /// Resolves a mixed list of slice and sliver URNs to sliver records,
    /// all-or-nothing. For a slice URN the credential check comes first, so
    /// an unauthorized slice and an absent one answer identically; the
    /// second pass requires a credential for every resolved sliver.
    pub(crate) async fn authorize_and_list_slivers(
        &self,
        caller: &Caller,
        urns: &[String],
        credentials: &[Credential],
    ) -> FederaResult<Vec<Object>> {
        let identifiers = Identifier::parse_many(urns)?;
        let mut slivers: Vec<Object> = Vec::new();
        for id in &identifiers {
            match id.resource_type {
                ResourceType::Slice => {
                    self.authorizer()
                        .find_credential(&caller.user, Some(id), credentials)?;
                    let hash = naming::slice_hash(id)?;
                    let selector = LabelSelector::new(geni::LABEL_SLICE_HASH, hash);
                    let found = self
                        .store_call(self.store().list(Kind::Sliver, Some(&selector)))
                        .await
                        .map_err(|e| FederaError::server("failed to list slivers", e))?;
                    slivers.extend(found);
                }
                ResourceType::Sliver => {
                    match self
                        .store_call(self.store().get(Kind::Sliver, &id.resource_name))
                        .await
                    {
                        Ok(o) => slivers.push(o),
                        Err(StoreError::NotFound(..)) => {
                            return Err(FederaError::SearchFailed(format!(
                                "no sliver named {:?}",
                                id.resource_name
                            )));
                        }
                        Err(e) => return Err(FederaError::server("failed to get sliver", e)),
                    }
                }
                other => {
                    return Err(FederaError::BadArguments(format!(
                        "cannot operate on {other} identifiers"
                    )));
                }
            }
        }
        slivers.sort_by(|a, b| a.meta.name.cmp(&b.meta.name));
        slivers.dedup_by(|a, b| a.meta.name == b.meta.name);
        if slivers.is_empty() {
            return Err(FederaError::SearchFailed("no slivers found".into()));
        }
        for object in &slivers {
            let spec = sliver_spec(object)?;
            let sliver_urn = Identifier::parse(&spec.urn)?;
            let slice_urn = Identifier::parse(&spec.slice_urn)?;
            self.authorizer().find_credential_for_sliver(
                &caller.user,
                &sliver_urn,
                &slice_urn,
                credentials,
            )?;
        }
        Ok(slivers)
    }

    async fn manifest_value(&self, slivers: &[Object]) -> FederaResult<ManifestValue> {
        let mut manifest = Rspec::new(TYPE_MANIFEST);
        let mut infos = Vec::with_capacity(slivers.len());
        for object in slivers {
            let spec = sliver_spec(object)?;
            manifest
                .nodes
                .push(self.manifest_node(&object.meta.name, spec).await?);
            infos.push(self.sliver_info(&object.meta.name).await?);
        }
        Ok(ManifestValue {
            geni_rspec: manifest.to_xml(),
            geni_slivers: infos,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers

pub(crate) fn sliver_spec(object: &Object) -> FederaResult<&SliverSpec> {
    object.as_sliver().ok_or_else(|| {
        FederaError::server(
            "corrupt store object",
            format!("{} is not a sliver", object.meta.name),
        )
    })
}

fn enclosing_slice_urn(slivers: &[Object]) -> FederaResult<String> {
    let first = slivers
        .first()
        .ok_or_else(|| FederaError::SearchFailed("no slivers found".into()))?;
    Ok(sliver_spec(first)?.slice_urn.clone())
}

fn collect_keys(users: &[GeniUser]) -> String {
    let mut keys: Vec<&str> = Vec::new();
    for user in users {
        for key in &user.keys {
            let key = key.trim();
            if !key.is_empty() {
                keys.push(key);
            }
        }
    }
    keys.join("\n")
}

fn parse_time(s: &str) -> FederaResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FederaError::BadTime(e.to_string()))
}

pub(crate) fn rfc3339(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn check_rspec_version(version: Option<&RspecVersion>) -> FederaResult<()> {
    let Some(version) = version else { return Ok(()) };
    if version.version_type.eq_ignore_ascii_case("geni") && version.version == "3" {
        Ok(())
    } else {
        Err(FederaError::BadVersion(format!(
            "{} {} is not offered",
            version.version_type, version.version
        )))
    }
}

/// Advertised coordinates carry a leading hemisphere letter; strip it.
fn strip_hemisphere(coordinate: &str) -> String {
    match coordinate.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => coordinate[1..].to_string(),
        _ => coordinate.to_string(),
    }
}

fn node_location(spec: &NodeSpec) -> Option<Location> {
    if spec.country.is_empty() {
        return None;
    }
    Some(Location {
        country: spec.country.clone(),
        latitude: strip_hemisphere(&spec.latitude),
        longitude: strip_hemisphere(&spec.longitude),
    })
}

fn compress_zlib_base64(data: &str) -> FederaResult<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data.as_bytes())
        .map_err(|e| FederaError::server("failed to compress rspec", e))?;
    let compressed = encoder
        .finish()
        .map_err(|e| FederaError::server("failed to compress rspec", e))?;
    Ok(BASE64.encode(compressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use std::io::Read as _;

    #[test]
    fn hemisphere_letters_are_stripped() {
        assert_eq!(strip_hemisphere("N52.31"), "52.31");
        assert_eq!(strip_hemisphere("E4.95"), "4.95");
        assert_eq!(strip_hemisphere("52.31"), "52.31");
        assert_eq!(strip_hemisphere(""), "");
    }

    #[test]
    fn collect_keys_joins_and_trims() {
        let users = [
            GeniUser {
                urn: "urn:publicid:IDN+example.org+authority+user1".into(),
                keys: vec!["ssh-ed25519 AAAA\n".into(), String::new()],
            },
            GeniUser {
                urn: "urn:publicid:IDN+example.org+authority+user2".into(),
                keys: vec!["ssh-rsa BBBB".into()],
            },
        ];
        assert_eq!(collect_keys(&users), "ssh-ed25519 AAAA\nssh-rsa BBBB");
    }

    #[test]
    fn rspec_version_check() {
        assert!(check_rspec_version(None).is_ok());
        let ok = RspecVersion {
            version_type: "GENI".into(),
            version: "3".into(),
            ..RspecVersion::default()
        };
        assert!(check_rspec_version(Some(&ok)).is_ok());
        let bad = RspecVersion {
            version_type: "geni".into(),
            version: "2".into(),
            ..RspecVersion::default()
        };
        assert!(matches!(
            check_rspec_version(Some(&bad)),
            Err(FederaError::BadVersion(_))
        ));
    }

    #[test]
    fn compressed_rspec_round_trips() {
        let xml = "<rspec type=\"advertisement\"></rspec>";
        let encoded = compress_zlib_base64(xml).unwrap();
        let bytes = BASE64.decode(encoded).unwrap();
        let mut decoder = flate2::read::ZlibDecoder::new(bytes.as_slice());
        let mut decompressed = String::new();
        decoder.read_to_string(&mut decompressed).unwrap();
        assert_eq!(decompressed, xml);
    }

    #[test]
    fn failure_reply_carries_code_and_output() {
        let error = FederaError::Forbidden("no matching credential found".into());
        let reply: Reply<Vec<SliverInfo>> = Reply::failure(&error);
        assert_eq!(reply.code.geni_code, 3);
        assert_eq!(reply.output, "invalid credentials: no matching credential found");
        assert!(reply.value.is_empty());
    }

    #[tokio::test]
    async fn allocate_requires_nodes_in_request() {
        let (service, store) = testutil::service();
        let args = AllocateArgs {
            slice_urn: testutil::SLICE.into(),
            credentials: vec![testutil::sfa(testutil::USER, testutil::SLICE)],
            rspec: r#"<rspec type="request"></rspec>"#.into(),
            options: Options::default(),
        };
        let reply = service.allocate(&testutil::caller(), args).await;
        assert_eq!(reply.code.geni_code, 1);
        assert!(store.list(Kind::Sliver, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_credential_is_rejected() {
        let (service, _store) = testutil::service();
        let args = ListResourcesArgs {
            credentials: vec![testutil::sfa_expiring(
                testutil::USER,
                testutil::SLICE,
                "2020-01-01T00:00:00Z",
            )],
            options: Options::default(),
        };
        let reply = service.list_resources(&testutil::caller(), args).await;
        assert_eq!(reply.code.geni_code, 3);
        assert!(reply.output.contains("expired"));
    }

    #[test]
    fn reply_wire_shape() {
        let reply = Reply::success("manifest".to_string());
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["code"]["geni_code"], 0);
        assert_eq!(json["value"], "manifest");
        // Empty output is omitted entirely, clients treat presence as failure.
        assert!(json.get("output").is_none());
    }
}
