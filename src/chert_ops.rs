//! Operator sugar over the named set operations.

use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Sub, SubAssign};

use crate::Chert;

macro_rules! binary_op {
    ($Op:ident, $fn:ident, $method:ident, $method_with:ident) => {
        impl $Op<&Chert> for &Chert {
            type Output = Chert;
            fn $fn(self, rhs: &Chert) -> Chert {
                self.$method(rhs)
            }
        }
        impl $Op<Chert> for &Chert {
            type Output = Chert;
            fn $fn(self, rhs: Chert) -> Chert {
                self.$method(&rhs)
            }
        }
        impl $Op<&Chert> for Chert {
            type Output = Chert;
            fn $fn(mut self, rhs: &Chert) -> Chert {
                // result flag = lhs flag && rhs flag, as in the by-ref form
                let cow = self.copy_on_write() && rhs.copy_on_write();
                self.$method_with(rhs);
                self.set_copy_on_write(cow);
                self
            }
        }
        impl $Op<Chert> for Chert {
            type Output = Chert;
            fn $fn(mut self, rhs: Chert) -> Chert {
                let cow = self.copy_on_write() && rhs.copy_on_write();
                self.$method_with(&rhs);
                self.set_copy_on_write(cow);
                self
            }
        }
    };
}

binary_op!(BitOr, bitor, union, union_with);
binary_op!(BitAnd, bitand, intersection, intersection_with);
binary_op!(Sub, sub, difference, difference_with);
binary_op!(BitXor, bitxor, symmetric_difference, symmetric_difference_with);

macro_rules! assign_op {
    ($Op:ident, $fn:ident, $method_with:ident) => {
        impl $Op<&Chert> for Chert {
            fn $fn(&mut self, rhs: &Chert) {
                self.$method_with(rhs);
            }
        }
        impl $Op<Chert> for Chert {
            fn $fn(&mut self, rhs: Chert) {
                self.$method_with(&rhs);
            }
        }
    };
}

assign_op!(BitOrAssign, bitor_assign, union_with);
assign_op!(BitAndAssign, bitand_assign, intersection_with);
assign_op!(SubAssign, sub_assign, difference_with);
assign_op!(BitXorAssign, bitxor_assign, symmetric_difference_with);

#[cfg(test)]
mod tests {
    use crate::Chert;

    #[test]
    fn test_operator_sugar() {
        let a = Chert::from([1u32, 2, 3]);
        let b = Chert::from([3u32, 4, 5]);

        assert_eq!(&a | &b, a.union(&b));
        assert_eq!(&a & &b, a.intersection(&b));
        assert_eq!(&a - &b, a.difference(&b));
        assert_eq!(&a ^ &b, a.symmetric_difference(&b));

        let mut c = a.clone();
        c |= &b;
        assert_eq!(c, &a | &b);

        let mut c = a.clone();
        c &= b.clone();
        assert_eq!(c, &a & &b);

        let mut c = a.clone();
        c -= &b;
        assert_eq!(c, &a - &b);

        let mut c = a.clone();
        c ^= &b;
        assert_eq!(c, &a ^ &b);

        // moving forms route through the in-place ops
        assert_eq!(a.clone() | &b, &a | &b);
        assert_eq!(a.clone() ^ b.clone(), &a ^ &b);
    }

    #[test]
    fn test_operator_copy_on_write_flag() {
        let mut a = Chert::from([1u32, 2, 3]);
        let b = Chert::from([3u32, 4, 5]);
        a.set_copy_on_write(true);

        // mixed flags: the result flag is the conjunction, whichever form
        assert!(!(&a | &b).copy_on_write());
        assert!(!(a.clone() | &b).copy_on_write());
        assert!(!(a.clone() & b.clone()).copy_on_write());
        assert!(!(a.clone() - &b).copy_on_write());
        assert!(!(a.clone() ^ &b).copy_on_write());

        let mut both = b.clone();
        both.set_copy_on_write(true);
        assert!((&a | &both).copy_on_write());
        assert!((a.clone() | &both).copy_on_write());
        assert!((a.clone() ^ both.clone()).copy_on_write());
    }
}
