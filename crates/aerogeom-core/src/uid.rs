//! UID注册表与失效级联
//!
//! 每个模型拥有一个 [`UidRegistry`]，维护两张非拥有映射：
//! - `uid -> 对象`
//! - `uid -> 引用该uid的对象`（反向边，带计数）
//!
//! 对象通过内嵌的 [`UidLink`] 完成注册、引用登记和注销。`UidLink` 在析构时
//! 自动注销自身 uid 以及它持有的全部引用，因此从容器中移除对象即可清理注册表。
//!
//! 失效沿反向边传播：对象先清理自身缓存，再通知所有引用它的对象。
//! 每个对象带一个重入标记，引用成环时第二次进入直接返回。

use crate::error::{ModelError, Result};
use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// 可注册到 [`UidRegistry`] 的对象
pub trait UidObject: Any {
    /// 注册表簿记
    fn link(&self) -> &UidLink;

    /// 类型名（用于错误信息）
    fn type_name(&self) -> &'static str;

    /// 清理本对象的缓存；`source` 为触发失效的对象 uid
    fn invalidate_impl(&self, source: Option<&str>);

    /// 被引用对象的 uid 已经改变，持有者据此更新自己保存的引用字段
    fn notify_uid_change(&self, _old: &str, _new: &str) {}

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any>;

    /// 使本对象及所有依赖它的对象失效
    fn invalidate(&self, source: Option<&str>) {
        cascade(self, source);
    }
}

/// 失效级联
fn cascade<O: UidObject + ?Sized>(object: &O, source: Option<&str>) {
    let link = object.link();
    let Some(_guard) = ReentrancyGuard::enter(&link.invalidating) else {
        return;
    };

    object.invalidate_impl(source);

    let uid = link.uid();
    if uid.is_empty() {
        return;
    }
    let holders = link.registry.referencing_objects(&uid);
    if !holders.is_empty() {
        debug!("Invalidating {} -> {} referencing objects", uid, holders.len());
    }
    for holder in holders {
        holder.invalidate(Some(&uid));
    }
}

/// 重入标记，作用域结束（包括展开）时释放
struct ReentrancyGuard<'a>(&'a Cell<bool>);

impl<'a> ReentrancyGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// 对象在注册表中的簿记信息
pub struct UidLink {
    registry: Rc<UidRegistry>,
    this: Weak<dyn UidObject>,
    uid: RefCell<String>,
    required: bool,
    invalidating: Cell<bool>,
    references: RefCell<Vec<String>>,
}

impl UidLink {
    /// 创建簿记信息，此时尚未注册，需在对象构造完成后调用 [`UidLink::register`]
    pub fn new(
        registry: &Rc<UidRegistry>,
        this: Weak<dyn UidObject>,
        uid: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            registry: Rc::clone(registry),
            this,
            uid: RefCell::new(uid.into()),
            required,
            invalidating: Cell::new(false),
            references: RefCell::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Rc<UidRegistry> {
        &self.registry
    }

    pub fn uid(&self) -> String {
        self.uid.borrow().clone()
    }

    pub fn uid_ref(&self) -> Ref<'_, String> {
        self.uid.borrow()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// 本对象当前持有的引用
    pub fn references(&self) -> Vec<String> {
        self.references.borrow().clone()
    }

    /// 把对象登记到注册表
    pub fn register(&self) -> Result<()> {
        let uid = self.uid();
        if uid.is_empty() {
            if self.required {
                return Err(ModelError::InvalidArgument(
                    "a required uid must not be empty".to_string(),
                ));
            }
            return Ok(());
        }
        self.registry.register(&uid, self.this.clone())
    }

    /// 修改 uid；先更新注册表（迁移反向边并通知引用者），成功后才写入新值
    pub fn set_uid(&self, new_uid: &str) -> Result<()> {
        let old_uid = self.uid();
        if old_uid == new_uid {
            return Ok(());
        }
        if new_uid.is_empty() {
            if self.required {
                return Err(ModelError::InvalidArgument(
                    "a required uid must not be empty".to_string(),
                ));
            }
            self.registry.unregister_object(&old_uid, &self.this);
        } else if old_uid.is_empty() {
            self.registry.register(new_uid, self.this.clone())?;
        } else {
            self.registry.update_uid(&old_uid, new_uid)?;
        }
        *self.uid.borrow_mut() = new_uid.to_string();
        Ok(())
    }

    /// 登记对 `uid` 的引用；空 uid 不登记
    pub fn add_reference(&self, uid: &str) {
        if uid.is_empty() {
            return;
        }
        self.registry.register_reference(uid, &self.this);
        self.references.borrow_mut().push(uid.to_string());
    }

    /// 撤销一次对 `uid` 的引用
    pub fn remove_reference(&self, uid: &str) {
        if uid.is_empty() {
            return;
        }
        let removed = {
            let mut references = self.references.borrow_mut();
            match references.iter().position(|r| r == uid) {
                Some(index) => {
                    references.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.registry.unregister_reference(uid, &self.this);
        }
    }

    /// 用新引用替换旧引用
    pub fn replace_reference(&self, old_uid: &str, new_uid: &str) {
        self.remove_reference(old_uid);
        self.add_reference(new_uid);
    }

    /// 被引用对象改名后同步本地记录（注册表中的反向边已由注册表迁移）
    fn rename_reference(&self, old_uid: &str, new_uid: &str) {
        for reference in self.references.borrow_mut().iter_mut() {
            if reference == old_uid {
                *reference = new_uid.to_string();
            }
        }
    }
}

impl UidLink {
    /// 从注册表中注销本对象和它持有的全部引用
    ///
    /// 对象被移出容器时调用；之后对象仍可被外部持有，但不再可解析。
    pub(crate) fn detach(&self) {
        let uid = self.uid();
        if !uid.is_empty() {
            self.registry.unregister_object(&uid, &self.this);
        }
        let references = std::mem::take(&mut *self.references.borrow_mut());
        for reference in references {
            self.registry.unregister_reference(&reference, &self.this);
        }
    }
}

impl Drop for UidLink {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for UidLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UidLink")
            .field("uid", &*self.uid.borrow())
            .field("required", &self.is_required())
            .field("references", &*self.references.borrow())
            .finish()
    }
}

/// 反向边
struct BackEdge {
    holder: Weak<dyn UidObject>,
    count: usize,
}

/// UID注册表
#[derive(Default)]
pub struct UidRegistry {
    objects: RefCell<HashMap<String, Weak<dyn UidObject>>>,
    references: RefCell<HashMap<String, Vec<BackEdge>>>,
}

impl UidRegistry {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    // === 对象目录 ===

    /// 登记 `uid -> object`；空 uid 为无操作
    pub fn register(&self, uid: &str, object: Weak<dyn UidObject>) -> Result<()> {
        if uid.is_empty() {
            return Ok(());
        }
        let mut objects = self.objects.borrow_mut();
        if let Some(existing) = objects.get(uid) {
            if Weak::ptr_eq(existing, &object) {
                return Ok(());
            }
            if let Some(existing) = existing.upgrade() {
                return Err(ModelError::DuplicateUid {
                    uid: uid.to_string(),
                    existing: existing.type_name(),
                });
            }
            warn!("UID '{}' was bound to a dropped object, replacing it", uid);
        }
        objects.insert(uid.to_string(), object);
        Ok(())
    }

    /// 注销 `uid`，不存在时返回 `false`
    pub fn unregister(&self, uid: &str) -> bool {
        self.objects.borrow_mut().remove(uid).is_some()
    }

    /// 仅当 `uid` 仍绑定到 `object` 时注销
    fn unregister_object(&self, uid: &str, object: &Weak<dyn UidObject>) -> bool {
        let mut objects = self.objects.borrow_mut();
        match objects.get(uid) {
            Some(existing) if Weak::ptr_eq(existing, object) => {
                objects.remove(uid);
                true
            }
            _ => false,
        }
    }

    /// `uid` 是否绑定到存活对象
    pub fn contains(&self, uid: &str) -> bool {
        self.objects
            .borrow()
            .get(uid)
            .is_some_and(|object| object.strong_count() > 0)
    }

    pub fn len(&self) -> usize {
        self.objects
            .borrow()
            .values()
            .filter(|object| object.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 查找对象；不存在或已释放时返回 `UidNotFound`
    pub fn resolve(&self, uid: &str) -> Result<Rc<dyn UidObject>> {
        self.objects
            .borrow()
            .get(uid)
            .and_then(Weak::upgrade)
            .ok_or_else(|| ModelError::UidNotFound(uid.to_string()))
    }

    /// 按类型查找对象
    pub fn resolve_as<T: UidObject>(&self, uid: &str) -> Result<Rc<T>> {
        let object = self.resolve(uid)?;
        let found = object.type_name();
        object
            .as_any_rc()
            .downcast::<T>()
            .map_err(|_| ModelError::UidTypeMismatch {
                uid: uid.to_string(),
                expected: short_type_name::<T>(),
                found,
            })
    }

    /// 某一类型的全部对象，按 uid 排序
    pub fn objects_of_type<T: UidObject>(&self) -> Vec<Rc<T>> {
        let mut entries: Vec<(String, Rc<dyn UidObject>)> = self
            .objects
            .borrow()
            .iter()
            .filter_map(|(uid, object)| object.upgrade().map(|o| (uid.clone(), o)))
            .collect();
        entries.sort_by(|l, r| l.0.cmp(&r.0));
        entries
            .into_iter()
            .filter_map(|(_, object)| object.as_any_rc().downcast::<T>().ok())
            .collect()
    }

    /// 对象改名：迁移目录项和反向边，然后通知所有引用者
    ///
    /// 必须在对象保存的 uid 改变之前调用。
    pub fn update_uid(&self, old_uid: &str, new_uid: &str) -> Result<()> {
        if new_uid.is_empty() {
            return Err(ModelError::InvalidArgument(format!(
                "cannot rename '{}' to an empty uid",
                old_uid
            )));
        }

        {
            let mut objects = self.objects.borrow_mut();
            let object = objects
                .get(old_uid)
                .filter(|object| object.strong_count() > 0)
                .cloned()
                .ok_or_else(|| ModelError::UidNotFound(old_uid.to_string()))?;
            if old_uid == new_uid {
                return Ok(());
            }
            if let Some(existing) = objects.get(new_uid).and_then(Weak::upgrade) {
                return Err(ModelError::DuplicateUid {
                    uid: new_uid.to_string(),
                    existing: existing.type_name(),
                });
            }
            objects.remove(old_uid);
            objects.insert(new_uid.to_string(), object);
        }

        let holders: Vec<Rc<dyn UidObject>> = {
            let mut references = self.references.borrow_mut();
            match references.remove(old_uid) {
                Some(edges) => {
                    let holders = edges.iter().filter_map(|e| e.holder.upgrade()).collect();
                    let target = references.entry(new_uid.to_string()).or_default();
                    for edge in edges {
                        match target.iter_mut().find(|e| Weak::ptr_eq(&e.holder, &edge.holder)) {
                            Some(existing) => existing.count += edge.count,
                            None => target.push(edge),
                        }
                    }
                    holders
                }
                None => Vec::new(),
            }
        };

        debug!("Renaming UID {} -> {} ({} referencing objects)", old_uid, new_uid, holders.len());
        for holder in holders {
            holder.link().rename_reference(old_uid, new_uid);
            holder.notify_uid_change(old_uid, new_uid);
        }
        Ok(())
    }

    /// 生成未被占用的 uid：`base`、`baseU1`、`baseU2` ...
    pub fn make_unique_uid(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}U{}", base, n))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    // === 反向边 ===

    /// 登记 `holder` 对 `uid` 的一次引用；空 uid 为无操作
    pub fn register_reference(&self, uid: &str, holder: &Weak<dyn UidObject>) {
        if uid.is_empty() {
            return;
        }
        let mut references = self.references.borrow_mut();
        let edges = references.entry(uid.to_string()).or_default();
        match edges.iter_mut().find(|e| Weak::ptr_eq(&e.holder, holder)) {
            Some(edge) => edge.count += 1,
            None => edges.push(BackEdge {
                holder: holder.clone(),
                count: 1,
            }),
        }
    }

    /// 撤销 `holder` 对 `uid` 的一次引用
    pub fn unregister_reference(&self, uid: &str, holder: &Weak<dyn UidObject>) {
        if uid.is_empty() {
            return;
        }
        let mut references = self.references.borrow_mut();
        let Some(edges) = references.get_mut(uid) else {
            return;
        };
        if let Some(index) = edges.iter().position(|e| Weak::ptr_eq(&e.holder, holder)) {
            edges[index].count -= 1;
            if edges[index].count == 0 {
                edges.remove(index);
            }
        }
        if edges.is_empty() {
            references.remove(uid);
        }
    }

    /// 是否有对象引用 `uid`
    pub fn is_referenced(&self, uid: &str) -> bool {
        self.references
            .borrow()
            .get(uid)
            .is_some_and(|edges| !edges.is_empty())
    }

    /// 引用 `uid` 的所有存活对象
    pub fn referencing_objects(&self, uid: &str) -> Vec<Rc<dyn UidObject>> {
        let references = self.references.borrow();
        let Some(edges) = references.get(uid) else {
            return Vec::new();
        };
        edges
            .iter()
            .filter_map(|edge| {
                let holder = edge.holder.upgrade();
                if holder.is_none() {
                    warn!("Back-edge of UID '{}' points to a dropped object", uid);
                }
                holder
            })
            .collect()
    }
}

impl std::fmt::Debug for UidRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut uids: Vec<String> = self.objects.borrow().keys().cloned().collect();
        uids.sort();
        f.debug_struct("UidRegistry").field("uids", &uids).finish()
    }
}

/// 取得父对象的强引用，父对象已释放时返回 `DetachedObject`
pub(crate) fn attached<T>(parent: &Weak<T>, child: &UidLink) -> Result<Rc<T>> {
    parent
        .upgrade()
        .ok_or_else(|| ModelError::DetachedObject(child.uid()))
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
