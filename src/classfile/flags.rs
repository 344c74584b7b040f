//! Access and property flags for classes, fields and methods.
//!
//! The class file format reuses bit positions across contexts (`0x0020` is `ACC_SUPER` on a
//! class but `ACC_SYNCHRONIZED` on a method). [`crate::classfile::flags::AccessFlags`] names
//! every bit once and exposes the context-specific spellings as associated constants.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// All possible access flags of classes, fields and methods
    pub struct AccessFlags : u16 {
        /// Accessible from outside the package
        const PUBLIC = 0x0001;
        /// Accessible only within the defining class
        const PRIVATE = 0x0002;
        /// Accessible within subclasses
        const PROTECTED = 0x0004;
        /// Member belongs to the class, not to instances
        const STATIC = 0x0008;
        /// No subclassing, overriding or reassignment
        const FINAL = 0x0010;
        /// Method invocation is wrapped by a monitor (`ACC_SUPER` on classes)
        const SYNCHRONIZED = 0x0020;
        /// Field is volatile (`ACC_BRIDGE` on methods)
        const VOLATILE = 0x0040;
        /// Field is transient (`ACC_VARARGS` on methods)
        const TRANSIENT = 0x0080;
        /// Method is implemented outside the JVM
        const NATIVE = 0x0100;
        /// Class is an interface
        const INTERFACE = 0x0200;
        /// Class or method is abstract
        const ABSTRACT = 0x0400;
        /// Floating-point mode is FP-strict
        const STRICT = 0x0800;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
        /// Interface is an annotation type
        const ANNOTATION = 0x2000;
        /// Class or field is an enum (type or constant)
        const ENUM = 0x4000;
        /// Class is a module descriptor (`ACC_MANDATED` on parameters)
        const MODULE = 0x8000;
    }
}

impl AccessFlags {
    /// Class flag requesting modern `invokespecial` semantics.
    pub const SUPER: AccessFlags = AccessFlags::SYNCHRONIZED;
    /// Method is a compiler-generated bridge.
    pub const BRIDGE: AccessFlags = AccessFlags::VOLATILE;
    /// Method takes a variable number of arguments.
    pub const VARARGS: AccessFlags = AccessFlags::TRANSIENT;

    /// Returns `true` if code for a member with these flags must not exist.
    #[must_use]
    pub fn forbids_code(self) -> bool {
        self.intersects(AccessFlags::ABSTRACT | AccessFlags::NATIVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_share_bits() {
        assert_eq!(AccessFlags::SUPER.bits(), 0x0020);
        assert_eq!(AccessFlags::BRIDGE, AccessFlags::VOLATILE);
        assert_eq!(AccessFlags::VARARGS.bits(), 0x0080);
    }

    #[test]
    fn unknown_bits_are_retained() {
        let flags = AccessFlags::from_bits_retain(0x0009);
        assert!(flags.contains(AccessFlags::PUBLIC | AccessFlags::STATIC));
        assert!(!flags.forbids_code());
        assert!((AccessFlags::ABSTRACT | AccessFlags::PUBLIC).forbids_code());
    }
}
