use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{CoreError, MetaError};
use crate::record::{DataObject, RECORD_ROOT};

use super::class_map::ClassMapSettings;
use super::{Attr, CtorFn, FieldInfo, FieldKind, MethodFn, MethodInfo, TypeKind};

/// Declaration of one reflected type, consumed by [`Registry::register`].
#[derive(Clone)]
pub struct TypeDecl {
    full_name: &'static str,
    kind: TypeKind,
    base: Option<&'static str>,
    key_type: Option<&'static str>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    attrs: Vec<Attr>,
    ctor: CtorFn,
}

impl TypeDecl {
    /// Declare a record type. The base defaults to the typed-record root;
    /// derived records override it with [`TypeDecl::base`].
    pub fn record(full_name: &'static str, ctor: CtorFn) -> Self {
        Self {
            full_name,
            kind: TypeKind::Record,
            base: Some(RECORD_ROOT),
            key_type: None,
            fields: Vec::new(),
            methods: Vec::new(),
            attrs: Vec::new(),
            ctor,
        }
    }

    pub fn key(full_name: &'static str, ctor: CtorFn) -> Self {
        Self {
            full_name,
            kind: TypeKind::Key,
            base: None,
            key_type: None,
            fields: Vec::new(),
            methods: Vec::new(),
            attrs: Vec::new(),
            ctor,
        }
    }

    pub fn element(full_name: &'static str, ctor: CtorFn) -> Self {
        Self {
            full_name,
            kind: TypeKind::Element,
            base: None,
            key_type: None,
            fields: Vec::new(),
            methods: Vec::new(),
            attrs: Vec::new(),
            ctor,
        }
    }

    pub fn base(mut self, full_name: &'static str) -> Self {
        self.base = Some(full_name);
        self
    }

    pub fn key_type(mut self, full_name: &'static str) -> Self {
        self.key_type = Some(full_name);
        self
    }

    pub fn field(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldInfo { name, kind });
        self
    }

    pub fn method(mut self, name: &'static str, invoke: MethodFn) -> Self {
        self.methods.push(MethodInfo { name, invoke });
        self
    }

    pub fn attr(mut self, attr: Attr) -> Self {
        self.attrs.push(attr);
        self
    }
}

/// Immutable metadata for one registered type.
pub struct TypeInfo {
    pub full_name: &'static str,
    pub namespace: String,
    pub name: String,
    pub mapped_name: String,
    pub mapped_namespace: String,
    pub kind: TypeKind,
    pub base: Option<&'static str>,
    pub key_type: Option<&'static str>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attrs: Vec<Attr>,
    ctor: CtorFn,
}

impl TypeInfo {
    pub fn construct(&self) -> Box<dyn DataObject> {
        (self.ctor)()
    }

    /// Declared (not inherited) field lookup.
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declared (not inherited) method lookup.
    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }
}

impl std::fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeInfo")
            .field("full_name", &self.full_name)
            .field("mapped_name", &self.mapped_name)
            .field("kind", &self.kind)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

/// A parsed, validated index declaration for one record root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDecl {
    pub definition: String,
    pub name: String,
    pub elements: Vec<(String, i32)>,
}

#[derive(Default)]
struct Inner {
    by_name: HashMap<&'static str, Arc<TypeInfo>>,
    by_mapped: HashMap<String, Arc<TypeInfo>>,
}

/// Type metadata registry.
///
/// The process-wide instance lives behind [`Registry::shared`]; tests build
/// their own with [`Registry::new`]. Entries are append-only and immutable,
/// so steady-state reads take only the read lock.
pub struct Registry {
    class_map: ClassMapSettings,
    inner: RwLock<Inner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_class_map(ClassMapSettings::default())
    }

    pub fn with_class_map(class_map: ClassMapSettings) -> Self {
        Self {
            class_map,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Process-wide registry with default class-map settings.
    pub fn shared() -> Arc<Registry> {
        static SHARED: OnceLock<Arc<Registry>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(Registry::new())).clone()
    }

    pub fn class_map(&self) -> &ClassMapSettings {
        &self.class_map
    }

    /// Drop every registered type. Test hook; production code never unregisters.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("registry lock");
        inner.by_name.clear();
        inner.by_mapped.clear();
    }

    /// Register a type. Idempotent: re-registering a full name returns the
    /// existing entry untouched.
    pub fn register(&self, decl: TypeDecl) -> Arc<TypeInfo> {
        if let Some(existing) = self.get(decl.full_name) {
            return existing;
        }
        let mut inner = self.inner.write().expect("registry lock");
        if let Some(existing) = inner.by_name.get(decl.full_name) {
            return existing.clone();
        }
        let (namespace, name) = split_full_name(decl.full_name);
        let info = Arc::new(TypeInfo {
            full_name: decl.full_name,
            namespace: namespace.to_string(),
            name: name.to_string(),
            mapped_name: self.class_map.map_class_name(name),
            mapped_namespace: self.class_map.map_namespace(namespace),
            kind: decl.kind,
            base: decl.base,
            key_type: decl.key_type,
            fields: decl.fields,
            methods: decl.methods,
            attrs: decl.attrs,
            ctor: decl.ctor,
        });
        inner.by_name.insert(decl.full_name, info.clone());
        // Only discriminator-bearing kinds join the mapped-name index; key
        // types share mapped names with their records by convention.
        if info.kind != TypeKind::Key {
            inner
                .by_mapped
                .entry(info.mapped_name.clone())
                .or_insert_with(|| info.clone());
        }
        info
    }

    pub fn get(&self, full_name: &str) -> Option<Arc<TypeInfo>> {
        self.inner
            .read()
            .expect("registry lock")
            .by_name
            .get(full_name)
            .cloned()
    }

    pub fn require(&self, full_name: &str) -> Result<Arc<TypeInfo>, CoreError> {
        self.get(full_name).ok_or_else(|| {
            MetaError::UnknownType {
                name: full_name.to_string(),
            }
            .into()
        })
    }

    pub fn get_mapped(&self, mapped_name: &str) -> Option<Arc<TypeInfo>> {
        self.inner
            .read()
            .expect("registry lock")
            .by_mapped
            .get(mapped_name)
            .cloned()
    }

    pub fn require_mapped(&self, mapped_name: &str) -> Result<Arc<TypeInfo>, CoreError> {
        self.get_mapped(mapped_name).ok_or_else(|| {
            MetaError::UnknownMappedName {
                name: mapped_name.to_string(),
            }
            .into()
        })
    }

    /// The base chain from the type itself to its registered root,
    /// terminating below the typed-record root sentinel.
    pub fn base_chain(&self, full_name: &str) -> Result<Vec<Arc<TypeInfo>>, CoreError> {
        let mut chain = Vec::new();
        let mut current = self.require(full_name)?;
        loop {
            chain.push(current.clone());
            match current.base {
                Some(base) if base != RECORD_ROOT => {
                    current = self.require(base)?;
                }
                _ => return Ok(chain),
            }
        }
    }

    /// Field lookup across the declared type and its base chain.
    pub fn field_of(
        &self,
        full_name: &str,
        field: &str,
    ) -> Result<Option<(Arc<TypeInfo>, FieldInfo)>, CoreError> {
        for info in self.base_chain(full_name)? {
            if let Some(found) = info.field(field) {
                let found = found.clone();
                return Ok(Some((info, found)));
            }
        }
        Ok(None)
    }

    /// Method lookup across the declared type and its base chain.
    pub fn method_of(
        &self,
        full_name: &str,
        method: &str,
    ) -> Result<Option<MethodInfo>, CoreError> {
        for info in self.base_chain(full_name)? {
            if let Some(found) = info.method(method) {
                return Ok(Some(found.clone()));
            }
        }
        Ok(None)
    }

    /// Attributes declared on the type, walking the base chain when
    /// `inherit` is set (most-derived first).
    pub fn attrs_of(&self, full_name: &str, inherit: bool) -> Result<Vec<Attr>, CoreError> {
        if !inherit {
            return Ok(self.require(full_name)?.attrs.clone());
        }
        let mut attrs = Vec::new();
        for info in self.base_chain(full_name)? {
            attrs.extend(info.attrs.iter().cloned());
        }
        Ok(attrs)
    }

    /// Whether `full_name` is `ancestor` or declares it in its base chain.
    pub fn is_subtype_of(&self, full_name: &str, ancestor: &str) -> bool {
        let Ok(chain) = self.base_chain(full_name) else {
            return false;
        };
        chain.iter().any(|info| info.full_name == ancestor)
    }

    /// All registered strict descendants of the type.
    pub fn derived_types(&self, full_name: &str) -> Vec<Arc<TypeInfo>> {
        let names: Vec<&'static str> = {
            let inner = self.inner.read().expect("registry lock");
            inner.by_name.keys().copied().collect()
        };
        let mut derived: Vec<Arc<TypeInfo>> = names
            .into_iter()
            .filter(|name| *name != full_name && self.is_subtype_of(name, full_name))
            .filter_map(|name| self.get(name))
            .collect();
        derived.sort_by(|a, b| a.full_name.cmp(b.full_name));
        derived
    }

    /// Mapped names from the root to the type itself: the hierarchical `_t`
    /// discriminator.
    pub fn inheritance_chain(&self, full_name: &str) -> Result<Vec<String>, CoreError> {
        let mut chain = self.base_chain(full_name)?;
        chain.reverse();
        Ok(chain.into_iter().map(|info| info.mapped_name.clone()).collect())
    }

    /// The direct descendant of the typed-record root: owner of the storage
    /// collection shared by the whole hierarchy.
    pub fn root_of(&self, full_name: &str) -> Result<Arc<TypeInfo>, CoreError> {
        let chain = self.base_chain(full_name)?;
        Ok(chain.last().expect("chain is never empty").clone())
    }

    /// Storage collection name for the type: the root's mapped name.
    pub fn collection_of(&self, full_name: &str) -> Result<String, CoreError> {
        Ok(self.root_of(full_name)?.mapped_name.clone())
    }

    /// Declared key type, inherited from the nearest base that declares one.
    pub fn key_type_of(&self, full_name: &str) -> Result<Option<&'static str>, CoreError> {
        for info in self.base_chain(full_name)? {
            if let Some(key_type) = info.key_type {
                return Ok(Some(key_type));
            }
        }
        Ok(None)
    }

    /// Parse and validate every `IndexElements` attribute on the type and
    /// its base chain. Duplicate definitions are collapsed; a duplicate with
    /// a different custom name is an error.
    pub fn index_declarations(&self, full_name: &str) -> Result<Vec<IndexDecl>, CoreError> {
        let mut declarations: Vec<IndexDecl> = Vec::new();
        for attr in self.attrs_of(full_name, true)? {
            let Attr::IndexElements { definition, name } = attr else {
                continue;
            };
            let elements = self.parse_index_definition(full_name, &definition)?;
            let index_name = name.unwrap_or_else(|| definition.clone());
            if let Some(existing) = declarations
                .iter()
                .find(|decl| decl.definition == definition)
            {
                if existing.name != index_name {
                    return Err(MetaError::IndexDefinition {
                        definition,
                        reason: format!(
                            "duplicate definition with conflicting names `{}` and `{index_name}`",
                            existing.name
                        ),
                    }
                    .into());
                }
                continue;
            }
            declarations.push(IndexDecl {
                definition,
                name: index_name,
                elements,
            });
        }
        Ok(declarations)
    }

    fn parse_index_definition(
        &self,
        full_name: &str,
        definition: &str,
    ) -> Result<Vec<(String, i32)>, CoreError> {
        // A single leading `+` on the whole definition is permitted.
        let body = definition.strip_prefix('+').unwrap_or(definition);
        let mut elements = Vec::new();
        for token in body.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(MetaError::IndexDefinition {
                    definition: definition.to_string(),
                    reason: "empty element".to_string(),
                }
                .into());
            }
            let (field, order) = match token.strip_prefix('-') {
                Some(rest) => (rest.trim(), -1),
                None => (token, 1),
            };
            if self.field_of(full_name, field)?.is_none() {
                return Err(MetaError::IndexDefinition {
                    definition: definition.to_string(),
                    reason: format!("`{field}` is not a field of `{full_name}`"),
                }
                .into());
            }
            elements.push((field.to_string(), order));
        }
        Ok(elements)
    }
}

fn split_full_name(full_name: &str) -> (&str, &str) {
    match full_name.rsplit_once("::") {
        Some((namespace, name)) => (namespace, name),
        None => ("", full_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::FieldKind;
    use crate::record::DeletedRecordData;

    fn ctor() -> Box<dyn DataObject> {
        Box::new(DeletedRecordData::default())
    }

    fn clear_key(object: &mut dyn DataObject, _registry: &Registry) -> Result<(), CoreError> {
        object.set_field("record_id", crate::record::FieldValue::Null)
    }

    fn sample_registry() -> Registry {
        let registry = Registry::new();
        registry.register(
            TypeDecl::record("strata::tests::BaseSampleData", ctor)
                .key_type("strata::tests::BaseSampleKey")
                .field("record_id", FieldKind::String)
                .field("record_index", FieldKind::Int)
                .method("clear_key", clear_key)
                .attr(Attr::IndexElements {
                    definition: "record_id, -record_index".to_string(),
                    name: None,
                }),
        );
        registry.register(
            TypeDecl::record("strata::tests::DerivedSampleData", ctor)
                .base("strata::tests::BaseSampleData")
                .field("extra", FieldKind::String),
        );
        registry.register(
            TypeDecl::key("strata::tests::BaseSampleKey", ctor)
                .field("record_id", FieldKind::String)
                .field("record_index", FieldKind::Int),
        );
        registry
    }

    #[test]
    fn register_is_idempotent() {
        let registry = sample_registry();
        let first = registry.get("strata::tests::BaseSampleData").unwrap();
        let second = registry.register(TypeDecl::record("strata::tests::BaseSampleData", ctor));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn mapped_names_strip_conventions() {
        let registry = sample_registry();
        let info = registry.get("strata::tests::BaseSampleData").unwrap();
        assert_eq!(info.mapped_name, "BaseSample");
        assert_eq!(info.mapped_namespace, "tests");
        assert!(registry.get_mapped("BaseSample").is_some());
    }

    #[test]
    fn inherited_field_resolves_through_base_chain() {
        let registry = sample_registry();
        let (owner, field) = registry
            .field_of("strata::tests::DerivedSampleData", "record_index")
            .unwrap()
            .unwrap();
        assert_eq!(owner.full_name, "strata::tests::BaseSampleData");
        assert_eq!(field.kind, FieldKind::Int);
        assert!(registry
            .field_of("strata::tests::DerivedSampleData", "missing")
            .unwrap()
            .is_none());
    }

    #[test]
    fn method_lookup_walks_the_base_chain() {
        let registry = sample_registry();
        let method = registry
            .method_of("strata::tests::DerivedSampleData", "clear_key")
            .unwrap()
            .unwrap();
        assert_eq!(method.name, "clear_key");
        assert!(registry
            .method_of("strata::tests::BaseSampleData", "missing")
            .unwrap()
            .is_none());
    }

    #[test]
    fn subtype_and_derived_queries() {
        let registry = sample_registry();
        assert!(registry.is_subtype_of(
            "strata::tests::DerivedSampleData",
            "strata::tests::BaseSampleData"
        ));
        assert!(registry.is_subtype_of(
            "strata::tests::BaseSampleData",
            "strata::tests::BaseSampleData"
        ));
        assert!(!registry.is_subtype_of(
            "strata::tests::BaseSampleData",
            "strata::tests::DerivedSampleData"
        ));
        let derived = registry.derived_types("strata::tests::BaseSampleData");
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].full_name, "strata::tests::DerivedSampleData");
    }

    #[test]
    fn chain_and_collection_follow_the_root() {
        let registry = sample_registry();
        assert_eq!(
            registry
                .inheritance_chain("strata::tests::DerivedSampleData")
                .unwrap(),
            vec!["BaseSample".to_string(), "DerivedSample".to_string()]
        );
        assert_eq!(
            registry
                .collection_of("strata::tests::DerivedSampleData")
                .unwrap(),
            "BaseSample"
        );
        assert_eq!(
            registry
                .key_type_of("strata::tests::DerivedSampleData")
                .unwrap(),
            Some("strata::tests::BaseSampleKey")
        );
    }

    #[test]
    fn index_declarations_parse_and_validate() {
        let registry = sample_registry();
        let declarations = registry
            .index_declarations("strata::tests::DerivedSampleData")
            .unwrap();
        assert_eq!(declarations.len(), 1);
        assert_eq!(
            declarations[0].elements,
            vec![("record_id".to_string(), 1), ("record_index".to_string(), -1)]
        );

        let registry = Registry::new();
        registry.register(
            TypeDecl::record("strata::tests::BadIndexData", ctor).attr(Attr::IndexElements {
                definition: "no_such_field".to_string(),
                name: None,
            }),
        );
        assert!(registry
            .index_declarations("strata::tests::BadIndexData")
            .is_err());
    }

    #[test]
    fn leading_plus_is_stripped() {
        let registry = Registry::new();
        registry.register(
            TypeDecl::record("strata::tests::PlusData", ctor)
                .field("record_id", FieldKind::String)
                .attr(Attr::IndexElements {
                    definition: "+record_id".to_string(),
                    name: None,
                }),
        );
        let declarations = registry
            .index_declarations("strata::tests::PlusData")
            .unwrap();
        assert_eq!(declarations[0].elements, vec![("record_id".to_string(), 1)]);
    }
}
