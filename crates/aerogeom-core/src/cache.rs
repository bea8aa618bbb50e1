//! 惰性缓存单元
//!
//! 缓存单元只保存构建函数和上一次的结果，所属对象在查询时传入。
//! 失效时调用 `clear()` 丢弃结果，下一次查询重新构建。

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

type BuildFn<T, O, E> = Box<dyn Fn(&O) -> Result<T, E>>;

/// 绑定到所属对象类型 `O` 的缓存单元
///
/// 构建期间持有内部可变借用，构建函数再次查询同一单元会触发 `RefCell` 借用错误。
pub struct CacheCell<T, O: ?Sized, E = Infallible> {
    build: BuildFn<T, O, E>,
    slot: RefCell<Option<Rc<T>>>,
    builds: Cell<usize>,
}

impl<T, O: ?Sized, E> CacheCell<T, O, E> {
    /// 可能失败的构建函数；失败结果不会被缓存
    pub fn fallible(build: impl Fn(&O) -> Result<T, E> + 'static) -> Self {
        Self {
            build: Box::new(build),
            slot: RefCell::new(None),
            builds: Cell::new(0),
        }
    }

    /// 返回缓存值，失效时重新构建
    pub fn try_value(&self, owner: &O) -> Result<Rc<T>, E> {
        let mut slot = self.slot.borrow_mut();
        if let Some(value) = slot.as_ref() {
            return Ok(Rc::clone(value));
        }

        self.builds.set(self.builds.get() + 1);
        let value = Rc::new((self.build)(owner)?);
        *slot = Some(Rc::clone(&value));
        Ok(value)
    }

    /// 丢弃缓存值，不调用构建函数
    pub fn clear(&self) {
        self.slot.borrow_mut().take();
    }

    pub fn is_valid(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// 构建函数被调用的次数
    pub fn build_count(&self) -> usize {
        self.builds.get()
    }
}

impl<T, O: ?Sized> CacheCell<T, O, Infallible> {
    pub fn new(build: impl Fn(&O) -> T + 'static) -> Self {
        Self::fallible(move |owner| Ok(build(owner)))
    }

    pub fn value(&self, owner: &O) -> Rc<T> {
        match self.try_value(owner) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

impl<T, O: ?Sized, E> fmt::Debug for CacheCell<T, O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCell")
            .field("valid", &self.is_valid())
            .field("builds", &self.builds.get())
            .finish()
    }
}
